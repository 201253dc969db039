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

//! Aggregation Result Caching Layer
//!
//! Cache-aside store for computed result tables, keyed by
//! [`make_key`](crate::cache_key::make_key). Entries are never invalidated on
//! writes to the underlying data; a stale table is served until its TTL runs
//! out.
//!
//! ## Configuration
//!
//! - Max entries: 10,000
//! - TTL: 1 hour, overridable per entry

use moka::sync::Cache;
use moka::Expiry;
use retailpivot_core::ResultTable;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Key/value store for result tables
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> Option<ResultTable>;

    fn set(&self, key: String, table: ResultTable, ttl: Duration);

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

pub type SharedResultCache = Arc<dyn ResultCache>;

/// Configuration for the result cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached tables
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedTable {
    table: Arc<ResultTable>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedTable> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedTable,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// 0.0 - 1.0
    pub hit_rate: f64,
    pub entry_count: u64,
}

/// In-process result cache backed by moka
pub struct AnalyticsCache {
    cache: Cache<String, CachedTable>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AnalyticsCache {
    pub fn new(config: CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalyticsCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache for AnalyticsCache {
    fn get(&self, key: &str) -> Option<ResultTable> {
        match self.cache.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.table.as_ref().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// A zero TTL stores nothing
    fn set(&self, key: String, table: ResultTable, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.cache.insert(
            key,
            CachedTable {
                table: Arc::new(table),
                ttl,
            },
        );
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            entry_count: self.cache.entry_count(),
        }
    }
}
