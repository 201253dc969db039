// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Retailpivot Query Engine
//!
//! Turns a declarative analytics request (dimensions, metrics, one or two
//! date ranges, total flag) into a [`ResultTable`](retailpivot_core::ResultTable).

pub mod aggregation;
pub mod cache;
pub mod cache_key;
pub mod comparison;
pub mod engine;
pub mod registry;

pub use aggregation::{aggregate_lines, GroupAccumulator};
pub use cache::{AnalyticsCache, CacheConfig, CacheStats, ResultCache, SharedResultCache};
pub use cache_key::{make_key, TOTAL_SENTINEL};
pub use comparison::{merge_periods, round2, saturate_percent};
pub use engine::{AnalyticsEngine, AnalyticsQuery, AnalyticsReport};
pub use registry::{
    has_comparison_suffix, parse_requested_metric, registry, resolve_dimension, resolve_metric,
    Catalog, DerivedKind, Dimension, Metric, QueryPlan, Registry, RequestedMetric,
};
