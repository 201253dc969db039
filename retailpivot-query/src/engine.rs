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

//! Analytics engine
//!
//! Entry point combining the registry, the cache and a transaction source.
//! Aggregations are cache-aside: the key is computed from the resolved
//! request, a hit never touches the source, and a miss computes and stores
//! the table. Nothing is locked between compute and store, so concurrent
//! misses on the same key may both compute.

use retailpivot_core::{DateRange, ResultTable, Result, TransactionSource};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::aggregation::aggregate_lines;
use crate::cache::{CacheStats, SharedResultCache};
use crate::cache_key::{make_key, TOTAL_SENTINEL};
use crate::comparison::merge_periods;
use crate::registry::QueryPlan;

/// A declarative analytics request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default, rename = "group_by")]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    pub date_range: DateRange,
    #[serde(default)]
    pub prev_date_range: Option<DateRange>,
    #[serde(default)]
    pub total: bool,
}

/// Detail rows plus the optional total row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub data: ResultTable,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_total"
    )]
    pub total: Option<ResultTable>,
}

/// The total is a single object, `{}` when nothing matched
fn serialize_total<S: Serializer>(
    total: &Option<ResultTable>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match total.as_ref().and_then(|t| t.row(0)) {
        Some(row) => row.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

impl AnalyticsReport {
    /// The total row, when one was requested and is non-empty
    pub fn total_row(&self) -> Option<&ResultTable> {
        self.total.as_ref().filter(|t| !t.is_empty())
    }
}

/// Aggregation and comparison over a transaction source
#[derive(Clone)]
pub struct AnalyticsEngine {
    source: Arc<dyn TransactionSource>,
    cache: SharedResultCache,
    ttl: Duration,
}

impl AnalyticsEngine {
    pub fn new(source: Arc<dyn TransactionSource>, cache: SharedResultCache, ttl: Duration) -> Self {
        Self { source, cache, ttl }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Aggregate one date range
    ///
    /// Comparison suffixes are stripped, so `turnover_diff` yields the
    /// `turnover` column. Unknown names are dropped. Without any known base
    /// metric the result is an empty table.
    pub fn aggregate<D: AsRef<str>, M: AsRef<str>>(
        &self,
        range: &DateRange,
        dimensions: &[D],
        metrics: &[M],
        as_total: bool,
    ) -> Result<ResultTable> {
        let plan = QueryPlan::resolve(dimensions, metrics);
        self.aggregate_plan(range, &plan, as_total)
    }

    /// Compare two date ranges
    ///
    /// Output columns are the requested dimensions (none when totalling)
    /// followed by the requested metrics, base and derived, in request order.
    pub fn compare<D: AsRef<str>, M: AsRef<str>>(
        &self,
        current: &DateRange,
        previous: &DateRange,
        dimensions: &[D],
        metrics: &[M],
        as_total: bool,
    ) -> Result<ResultTable> {
        let plan = QueryPlan::resolve(dimensions, metrics);
        self.compare_plan(current, previous, &plan, as_total)
    }

    /// Run a request, comparing when a previous range is given
    ///
    /// Without a previous range, comparison columns are dropped.
    pub fn run_query(&self, query: &AnalyticsQuery, as_total: bool) -> Result<ResultTable> {
        let plan = QueryPlan::resolve(&query.dimensions, &query.metrics);
        match &query.prev_date_range {
            Some(previous) => self.compare_plan(&query.date_range, previous, &plan, as_total),
            None => self.aggregate_plan(&query.date_range, &plan.without_derived(), as_total),
        }
    }

    /// Detail rows, plus the total row when the request asks for it
    pub fn run_report(&self, query: &AnalyticsQuery) -> Result<AnalyticsReport> {
        let data = self.run_query(query, false)?;
        let total = if query.total {
            Some(self.run_query(query, true)?)
        } else {
            None
        };
        Ok(AnalyticsReport { data, total })
    }

    fn compare_plan(
        &self,
        current: &DateRange,
        previous: &DateRange,
        plan: &QueryPlan,
        as_total: bool,
    ) -> Result<ResultTable> {
        if plan.base_metrics.is_empty() {
            return Ok(ResultTable::empty());
        }

        let base = QueryPlan {
            dimensions: plan.dimensions.clone(),
            metrics: Vec::new(),
            base_metrics: plan.base_metrics.clone(),
        };
        let current_table = self.aggregate_plan(current, &base, as_total)?;
        let previous_table = self.aggregate_plan(previous, &base, as_total)?;

        let key_columns = if as_total {
            Vec::new()
        } else {
            plan.dimension_names()
        };
        Ok(merge_periods(
            &current_table,
            &previous_table,
            &key_columns,
            &plan.base_metrics,
            &plan.metrics,
        ))
    }

    fn aggregate_plan(
        &self,
        range: &DateRange,
        plan: &QueryPlan,
        as_total: bool,
    ) -> Result<ResultTable> {
        if plan.base_metrics.is_empty() {
            return Ok(ResultTable::empty());
        }

        let mut key_dimensions = plan.dimension_names();
        if as_total {
            key_dimensions.push(TOTAL_SENTINEL.to_string());
        }
        let metric_names = plan.base_metric_names();
        let key = make_key(range.from_date, range.to_date, &key_dimensions, &metric_names);

        let table = match self.cache.get(&key) {
            Some(table) => {
                debug!(key = %key, "Analytics cache hit");
                table
            }
            None => {
                debug!(key = %key, "Analytics cache miss");
                let mut lines = self.source.lines_between(range)?;
                lines.retain(|line| range.contains(&line.datetime));
                let table = aggregate_lines(&lines, &plan.dimensions, &plan.base_metrics, as_total);
                self.cache.set(key, table.clone(), self.ttl);
                table
            }
        };

        // a hit may come from a request naming the same columns in another order
        let dimension_names = if as_total {
            Vec::new()
        } else {
            plan.dimension_names()
        };
        let columns: Vec<&String> = dimension_names.iter().chain(metric_names.iter()).collect();
        let mut projected = table.select(&columns);
        projected.sort_by_columns(&dimension_names);
        Ok(projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AnalyticsCache, ResultCache};
    use chrono::{NaiveDate, TimeZone, Utc};
    use retailpivot_core::{TransactionLine, Value};
    use retailpivot_storage::{InMemoryStore, NewBrand, NewCartItem, NewProduct, NewReceipt, NewShop};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: InMemoryStore,
        calls: AtomicUsize,
    }

    impl TransactionSource for CountingSource {
        fn lines_between(&self, range: &DateRange) -> Result<Vec<TransactionLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.lines_between(range)
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range(from: NaiveDate, to: NaiveDate) -> DateRange {
        DateRange::new(from, to).unwrap()
    }

    fn item(product_id: u64, total: Decimal, margin: Decimal) -> NewCartItem {
        NewCartItem {
            product_id,
            price: total,
            original_price: None,
            qty: dec!(1),
            total_price: None,
            margin_price_total: margin,
            datetime: None,
        }
    }

    /// One shop, one brand, one product; 150/30 in March, 100/20 in February
    fn scenario_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let brand = store.create_brand(NewBrand { name: "Lavazza".into() }).unwrap();
        let shop = store.create_shop(NewShop { name: "Central".into() }).unwrap();
        let product = store
            .create_product(NewProduct {
                name: "Espresso".into(),
                brand_id: Some(brand.id),
            })
            .unwrap();

        for (day, total, margin) in [
            (Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(), dec!(150), dec!(30)),
            (Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap(), dec!(100), dec!(20)),
        ] {
            store
                .ingest_receipt(NewReceipt {
                    shop_id: shop.id,
                    datetime: day,
                    refund: false,
                    items: vec![item(product.id, total, margin)],
                })
                .unwrap();
        }
        store
    }

    fn engine_with(source: Arc<dyn TransactionSource>) -> (AnalyticsEngine, Arc<AnalyticsCache>) {
        let cache = Arc::new(AnalyticsCache::default());
        let engine = AnalyticsEngine::new(source, cache.clone(), Duration::from_secs(3600));
        (engine, cache)
    }

    fn march() -> DateRange {
        range(date(2024, 3, 1), date(2024, 3, 31))
    }

    fn february() -> DateRange {
        range(date(2024, 2, 1), date(2024, 2, 29))
    }

    #[test]
    fn test_empty_request_is_empty_table() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let table = engine
            .aggregate(&march(), &[] as &[&str], &[] as &[&str], false)
            .unwrap();
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_cached_aggregate_skips_source() {
        let source = Arc::new(CountingSource {
            inner: scenario_store(),
            calls: AtomicUsize::new(0),
        });
        let (engine, cache) = engine_with(source.clone());

        let first = engine
            .aggregate(&march(), &["shop_name"], &["turnover", "profit"], false)
            .unwrap();
        let second = engine
            .aggregate(&march(), &["shop_name"], &["profit", "turnover"], false)
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.value(0, "turnover"), second.value(0, "turnover"));
        // columns follow the second request even though it was served from cache
        assert_eq!(second.columns(), &["shop_name", "profit", "turnover"]);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_total_is_cached_separately() {
        let source = Arc::new(CountingSource {
            inner: scenario_store(),
            calls: AtomicUsize::new(0),
        });
        let (engine, _) = engine_with(source.clone());

        let grouped = engine.aggregate(&march(), &["shop_name"], &["turnover"], false).unwrap();
        let total = engine.aggregate(&march(), &["shop_name"], &["turnover"], true).unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(grouped.columns(), &["shop_name", "turnover"]);
        assert_eq!(total.columns(), &["turnover"]);
        assert_eq!(total.value(0, "turnover"), Some(&Value::Float(150.0)));
    }

    #[test]
    fn test_unknown_names_fall_back_to_total() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let table = engine
            .aggregate(&march(), &["cashier"], &["turnover", "bogus"], false)
            .unwrap();
        assert_eq!(table.columns(), &["turnover"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_aggregate_strips_comparison_suffixes() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let table = engine
            .aggregate(&march(), &["shop_name"], &["turnover_diff", "profit_prev"], false)
            .unwrap();
        assert_eq!(table.columns(), &["shop_name", "turnover", "profit"]);
        assert_eq!(table.value(0, "turnover"), Some(&Value::Float(150.0)));
        assert_eq!(table.value(0, "profit"), Some(&Value::Float(30.0)));
    }

    #[test]
    fn test_range_without_data_is_empty() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let table = engine
            .aggregate(&range(date(2023, 1, 1), date(2023, 1, 31)), &["shop_name"], &["turnover"], false)
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_brand_exclusion() {
        let store = scenario_store();
        let shop = store.list_shops(&Default::default())[0].id;
        let unbranded = store
            .create_product(NewProduct {
                name: "Water".into(),
                brand_id: None,
            })
            .unwrap();
        store
            .ingest_receipt(NewReceipt {
                shop_id: shop,
                datetime: Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap(),
                refund: false,
                items: vec![item(unbranded.id, dec!(5), dec!(1))],
            })
            .unwrap();
        let (engine, _) = engine_with(Arc::new(store));

        let by_brand = engine.aggregate(&march(), &["brand_name"], &["turnover"], false).unwrap();
        assert_eq!(by_brand.len(), 1);
        assert_eq!(by_brand.value(0, "brand_name"), Some(&Value::from("Lavazza")));
        assert_eq!(by_brand.value(0, "turnover"), Some(&Value::Float(150.0)));

        let by_shop = engine.aggregate(&march(), &["shop_name"], &["turnover"], false).unwrap();
        assert_eq!(by_shop.value(0, "turnover"), Some(&Value::Float(155.0)));
    }

    #[test]
    fn test_end_to_end_comparison() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let query = AnalyticsQuery {
            dimensions: vec!["shop_name".into()],
            metrics: vec!["turnover".into(), "profit".into(), "turnover_diff".into()],
            date_range: march(),
            prev_date_range: Some(february()),
            total: false,
        };

        let table = engine.run_query(&query, false).unwrap();
        assert_eq!(
            table.columns(),
            &["shop_name", "turnover", "profit", "turnover_diff"]
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(0, "shop_name"), Some(&Value::from("Central")));
        assert_eq!(table.value(0, "turnover"), Some(&Value::Float(150.0)));
        assert_eq!(table.value(0, "profit"), Some(&Value::Float(30.0)));
        assert_eq!(table.value(0, "turnover_diff"), Some(&Value::Float(50.0)));
    }

    #[test]
    fn test_comparison_total() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let table = engine
            .compare(
                &march(),
                &february(),
                &["shop_name"],
                &["turnover_prev", "turnover_diff_percent"],
                true,
            )
            .unwrap();
        assert_eq!(table.columns(), &["turnover_prev", "turnover_diff_percent"]);
        assert_eq!(table.value(0, "turnover_prev"), Some(&Value::Float(100.0)));
        assert_eq!(table.value(0, "turnover_diff_percent"), Some(&Value::Float(50.0)));
    }

    #[test]
    fn test_derived_without_previous_range_is_dropped() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let query = AnalyticsQuery {
            dimensions: vec!["shop_name".into()],
            metrics: vec!["turnover".into(), "turnover_diff".into()],
            date_range: march(),
            prev_date_range: None,
            total: false,
        };
        let table = engine.run_query(&query, false).unwrap();
        assert_eq!(table.columns(), &["shop_name", "turnover"]);
    }

    #[test]
    fn test_report_serialization() {
        let (engine, _) = engine_with(Arc::new(scenario_store()));
        let mut query = AnalyticsQuery {
            dimensions: vec!["shop_name".into()],
            metrics: vec!["turnover".into()],
            date_range: march(),
            prev_date_range: None,
            total: false,
        };

        let report = engine.run_report(&query).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": [{"shop_name": "Central", "turnover": 150.0}]})
        );

        query.total = true;
        let json = serde_json::to_value(engine.run_report(&query).unwrap()).unwrap();
        assert_eq!(json["total"], serde_json::json!({"turnover": 150.0}));

        query.date_range = range(date(2023, 1, 1), date(2023, 1, 2));
        let report = engine.run_report(&query).unwrap();
        assert!(report.total_row().is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, serde_json::json!({"data": [], "total": {}}));
    }

    #[test]
    fn test_query_deserializes_from_request_shape() {
        let query: AnalyticsQuery = serde_json::from_value(serde_json::json!({
            "metrics": ["turnover"],
            "group_by": ["shop_name"],
            "date_range": {"from_date": "2024-03-01", "to_date": "2024-03-31"},
            "total": true
        }))
        .unwrap();
        assert_eq!(query.dimensions, vec!["shop_name"]);
        assert_eq!(query.date_range, march());
        assert!(query.prev_date_range.is_none());
        assert!(query.total);
    }

    #[test]
    fn test_shared_cache_trait_object() {
        let cache: SharedResultCache = Arc::new(AnalyticsCache::default());
        let engine = AnalyticsEngine::new(Arc::new(scenario_store()), cache.clone(), Duration::from_secs(60));
        engine.aggregate(&march(), &["year"], &["checks_count"], false).unwrap();
        assert_eq!(cache.stats().misses, 1);
        assert!(cache.get("analytics:not-a-key").is_none());
    }
}
