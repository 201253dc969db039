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

//! Period-over-period comparison
//!
//! Joins a current and a previous aggregation on their grouping key and
//! derives `{metric}_prev`, `{metric}_diff` and `{metric}_diff_percent`
//! columns. A side missing a group, or a null metric, counts as 0.

use retailpivot_core::{ResultTable, Value};
use std::collections::BTreeMap;

use crate::registry::{DerivedKind, Metric, RequestedMetric};

/// Round to 2 decimals, ties to even on the scaled value
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Clamp infinite percentages to ±100 and map NaN to 0
pub fn saturate_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        100.0
    } else if value == f64::NEG_INFINITY {
        -100.0
    } else {
        value
    }
}

#[derive(Debug, Default)]
struct Sides {
    current: Option<Vec<f64>>,
    previous: Option<Vec<f64>>,
}

fn metric_values(table: &ResultTable, row: usize, metrics: &[Metric]) -> Vec<f64> {
    metrics
        .iter()
        .map(|m| {
            table
                .value(row, m.name())
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        })
        .collect()
}

fn key_of(table: &ResultTable, row: usize, key_columns: &[String]) -> Vec<Value> {
    key_columns
        .iter()
        .map(|c| table.value(row, c).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Outer-join two aggregations and project the requested columns
///
/// Output columns are `key_columns` followed by `requested` in order. Rows
/// come out in ascending key order. With no key columns (totals) the two
/// single-row tables are joined on the empty key.
pub fn merge_periods(
    current: &ResultTable,
    previous: &ResultTable,
    key_columns: &[String],
    base_metrics: &[Metric],
    requested: &[RequestedMetric],
) -> ResultTable {
    let mut joined: BTreeMap<Vec<Value>, Sides> = BTreeMap::new();
    for row in 0..current.len() {
        joined.entry(key_of(current, row, key_columns)).or_default().current =
            Some(metric_values(current, row, base_metrics));
    }
    for row in 0..previous.len() {
        joined.entry(key_of(previous, row, key_columns)).or_default().previous =
            Some(metric_values(previous, row, base_metrics));
    }

    let columns = key_columns
        .iter()
        .cloned()
        .chain(requested.iter().map(|m| m.column_name()))
        .collect();
    let mut table = ResultTable::new(columns);

    let zeros = vec![0.0; base_metrics.len()];
    for (key, sides) in joined {
        let current = sides.current.as_deref().unwrap_or(zeros.as_slice());
        let previous = sides.previous.as_deref().unwrap_or(zeros.as_slice());
        let pick = |metric: Metric, values: &[f64]| {
            base_metrics
                .iter()
                .position(|m| *m == metric)
                .map_or(0.0, |i| values[i])
        };

        let mut row = key;
        for requested_metric in requested {
            let metric = requested_metric.base();
            let cur = pick(metric, current);
            let prev = pick(metric, previous);
            let value = match requested_metric {
                RequestedMetric::Base(_) => cur,
                RequestedMetric::Derived(_, DerivedKind::Prev) => prev,
                RequestedMetric::Derived(_, DerivedKind::Diff) => round2(cur - prev),
                RequestedMetric::Derived(_, DerivedKind::DiffPercent) => {
                    let with_diff = RequestedMetric::Derived(metric, DerivedKind::Diff);
                    let diff = if requested.contains(&with_diff) {
                        round2(cur - prev)
                    } else {
                        cur - prev
                    };
                    round2(saturate_percent(diff / prev * 100.0))
                }
            };
            row.push(Value::Float(value));
        }
        table.push_row(row);
    }
    table
}
