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

//! Metric and dimension registry
//!
//! Process-wide, immutable catalog of the dimensions a transaction line can be
//! grouped by and the metrics a group can be measured with. Built once on
//! first use and shared read-only afterwards.
//!
//! Requested metric names may carry a comparison suffix (`_prev`, `_diff`,
//! `_diff_percent`). Parsing tries an exact base match before stripping a
//! suffix, so a base metric whose own name ends in a reserved suffix would
//! shadow the derived reading. No built-in metric does today.

use chrono::{Datelike, Timelike};
use once_cell::sync::Lazy;
use retailpivot_core::{TransactionLine, Value};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::aggregation::GroupAccumulator;

/// Grouping key projected from a transaction line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    ProductName,
    BrandName,
    ShopName,
    DayMonthYear,
    DayOfWeek,
    Month,
    MonthYear,
    Quarter,
    QuarterYear,
    Year,
    Hour,
}

impl Dimension {
    pub const ALL: [Dimension; 11] = [
        Dimension::ProductName,
        Dimension::BrandName,
        Dimension::ShopName,
        Dimension::DayMonthYear,
        Dimension::DayOfWeek,
        Dimension::Month,
        Dimension::MonthYear,
        Dimension::Quarter,
        Dimension::QuarterYear,
        Dimension::Year,
        Dimension::Hour,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::ProductName => "product_name",
            Dimension::BrandName => "brand_name",
            Dimension::ShopName => "shop_name",
            Dimension::DayMonthYear => "day_month_year",
            Dimension::DayOfWeek => "day_of_week",
            Dimension::Month => "month",
            Dimension::MonthYear => "month_year",
            Dimension::Quarter => "quarter",
            Dimension::QuarterYear => "quarter_year",
            Dimension::Year => "year",
            Dimension::Hour => "hour",
        }
    }

    /// Project a line onto this dimension
    ///
    /// Calendar buckets are taken in UTC. `day_of_week` counts from
    /// 1 = Sunday to 7 = Saturday; `month_year` and `quarter_year` are the
    /// first day of their period.
    pub fn project(self, line: &TransactionLine) -> Value {
        let date = line.datetime.date_naive();
        let quarter = (date.month0() / 3) as i64 + 1;
        match self {
            Dimension::ProductName => Value::Text(line.product_name.clone()),
            Dimension::BrandName => line
                .brand_name
                .as_ref()
                .map_or(Value::Null, |b| Value::Text(b.clone())),
            Dimension::ShopName => Value::Text(line.shop_name.clone()),
            Dimension::DayMonthYear => Value::Date(date),
            Dimension::DayOfWeek => Value::Int(date.weekday().number_from_sunday() as i64),
            Dimension::Month => Value::Int(date.month() as i64),
            Dimension::MonthYear => date.with_day(1).map_or(Value::Null, Value::Date),
            Dimension::Quarter => Value::Int(quarter),
            Dimension::QuarterYear => {
                chrono::NaiveDate::from_ymd_opt(date.year(), (quarter as u32 - 1) * 3 + 1, 1)
                    .map_or(Value::Null, Value::Date)
            }
            Dimension::Year => Value::Int(date.year() as i64),
            Dimension::Hour => Value::Int(line.datetime.hour() as i64),
        }
    }
}

/// Aggregation measured over a group of lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Turnover,
    Profit,
    SalesQty,
    ChecksCount,
    AvgCheck,
    AvgPrice,
    AvgCost,
    UniqueProductsSold,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Turnover,
        Metric::Profit,
        Metric::SalesQty,
        Metric::ChecksCount,
        Metric::AvgCheck,
        Metric::AvgPrice,
        Metric::AvgCost,
        Metric::UniqueProductsSold,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Turnover => "turnover",
            Metric::Profit => "profit",
            Metric::SalesQty => "sales_qty",
            Metric::ChecksCount => "checks_count",
            Metric::AvgCheck => "avg_check",
            Metric::AvgPrice => "avg_price",
            Metric::AvgCost => "avg_cost",
            Metric::UniqueProductsSold => "unique_products_sold",
        }
    }

    /// Evaluate over an accumulated group
    ///
    /// Sums over an empty group are null, counts are zero. Ratios are null
    /// when their denominator is null or zero.
    pub fn evaluate(self, acc: &GroupAccumulator) -> Option<Decimal> {
        match self {
            Metric::Turnover => acc.turnover(),
            Metric::Profit => acc.profit(),
            Metric::SalesQty => acc.sales_qty(),
            Metric::ChecksCount => Some(Decimal::from(acc.checks_count())),
            Metric::UniqueProductsSold => Some(Decimal::from(acc.unique_products())),
            Metric::AvgCheck => ratio(
                acc.turnover(),
                Some(Decimal::from(acc.checks_count())),
            ),
            Metric::AvgPrice => ratio(acc.turnover(), acc.sales_qty()),
            Metric::AvgCost => ratio(
                acc.turnover().zip(acc.profit()).map(|(t, p)| t - p),
                acc.sales_qty(),
            ),
        }
    }
}

fn ratio(numerator: Option<Decimal>, denominator: Option<Decimal>) -> Option<Decimal> {
    let denominator = denominator?;
    if denominator.is_zero() {
        return None;
    }
    numerator?.checked_div(denominator)
}

/// Comparison column derived from a base metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKind {
    Prev,
    Diff,
    DiffPercent,
}

impl DerivedKind {
    // longest first so `_diff_percent` is never read as `_diff`
    const ALL: [DerivedKind; 3] = [DerivedKind::DiffPercent, DerivedKind::Diff, DerivedKind::Prev];

    pub fn suffix(self) -> &'static str {
        match self {
            DerivedKind::Prev => "_prev",
            DerivedKind::Diff => "_diff",
            DerivedKind::DiffPercent => "_diff_percent",
        }
    }
}

/// A requested metric name after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestedMetric {
    Base(Metric),
    Derived(Metric, DerivedKind),
}

impl RequestedMetric {
    pub fn base(self) -> Metric {
        match self {
            RequestedMetric::Base(m) | RequestedMetric::Derived(m, _) => m,
        }
    }

    pub fn is_derived(self) -> bool {
        matches!(self, RequestedMetric::Derived(..))
    }

    pub fn column_name(self) -> String {
        match self {
            RequestedMetric::Base(m) => m.name().to_string(),
            RequestedMetric::Derived(m, kind) => format!("{}{}", m.name(), kind.suffix()),
        }
    }
}

/// Name lookup tables
pub struct Registry {
    dimensions: HashMap<&'static str, Dimension>,
    metrics: HashMap<&'static str, Metric>,
}

/// Names exposed by the catalog endpoint
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub dimensions: Vec<&'static str>,
    pub metrics: Vec<&'static str>,
    pub derived_suffixes: Vec<&'static str>,
}

impl Registry {
    fn builtin() -> Self {
        Self {
            dimensions: Dimension::ALL.iter().map(|d| (d.name(), *d)).collect(),
            metrics: Metric::ALL.iter().map(|m| (m.name(), *m)).collect(),
        }
    }

    pub fn dimension(&self, name: &str) -> Option<Dimension> {
        self.dimensions.get(name).copied()
    }

    pub fn metric(&self, name: &str) -> Option<Metric> {
        self.metrics.get(name).copied()
    }

    pub fn requested_metric(&self, name: &str) -> Option<RequestedMetric> {
        if let Some(metric) = self.metric(name) {
            return Some(RequestedMetric::Base(metric));
        }
        DerivedKind::ALL.iter().find_map(|kind| {
            name.strip_suffix(kind.suffix())
                .and_then(|base| self.metric(base))
                .map(|metric| RequestedMetric::Derived(metric, *kind))
        })
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            dimensions: Dimension::ALL.iter().map(|d| d.name()).collect(),
            metrics: Metric::ALL.iter().map(|m| m.name()).collect(),
            derived_suffixes: DerivedKind::ALL.iter().rev().map(|k| k.suffix()).collect(),
        }
    }
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::builtin);

pub fn registry() -> &'static Registry {
    &REGISTRY
}

pub fn resolve_dimension(name: &str) -> Option<Dimension> {
    registry().dimension(name)
}

pub fn resolve_metric(name: &str) -> Option<Metric> {
    registry().metric(name)
}

pub fn parse_requested_metric(name: &str) -> Option<RequestedMetric> {
    registry().requested_metric(name)
}

/// True when the raw name ends in a comparison suffix, known base or not
pub fn has_comparison_suffix(name: &str) -> bool {
    DerivedKind::ALL.iter().any(|k| name.ends_with(k.suffix()))
}

/// A request resolved against the registry
///
/// Unknown names are dropped. Duplicates collapse to their first occurrence,
/// keeping the requested order otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub dimensions: Vec<Dimension>,
    pub metrics: Vec<RequestedMetric>,
    pub base_metrics: Vec<Metric>,
}

impl QueryPlan {
    pub fn resolve<D: AsRef<str>, M: AsRef<str>>(dimensions: &[D], metrics: &[M]) -> Self {
        let mut plan = QueryPlan::default();

        for name in dimensions {
            match resolve_dimension(name.as_ref()) {
                Some(d) if !plan.dimensions.contains(&d) => plan.dimensions.push(d),
                Some(_) => {}
                None => debug!("Ignoring unknown dimension '{}'", name.as_ref()),
            }
        }

        for name in metrics {
            match parse_requested_metric(name.as_ref()) {
                Some(m) => {
                    if !plan.metrics.contains(&m) {
                        plan.metrics.push(m);
                    }
                    if !plan.base_metrics.contains(&m.base()) {
                        plan.base_metrics.push(m.base());
                    }
                }
                None => debug!("Ignoring unknown metric '{}'", name.as_ref()),
            }
        }

        plan
    }

    pub fn dimension_names(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn base_metric_names(&self) -> Vec<String> {
        self.base_metrics.iter().map(|m| m.name().to_string()).collect()
    }

    /// Requested metric columns in request order
    pub fn metric_columns(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.column_name()).collect()
    }

    /// This plan with every comparison column removed
    pub fn without_derived(&self) -> QueryPlan {
        let metrics: Vec<RequestedMetric> = self
            .metrics
            .iter()
            .copied()
            .filter(|m| !m.is_derived())
            .collect();
        QueryPlan {
            dimensions: self.dimensions.clone(),
            base_metrics: metrics.iter().map(|m| m.base()).collect(),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn line_at(y: i32, m: u32, d: u32, h: u32) -> TransactionLine {
        TransactionLine {
            receipt_id: 1,
            product_id: 1,
            product_name: "Espresso".into(),
            brand_name: Some("Lavazza".into()),
            shop_name: "Central".into(),
            datetime: Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap(),
            price: dec!(75),
            original_price: dec!(75),
            qty: dec!(2),
            total_price: dec!(150),
            margin_price_total: dec!(30),
        }
    }

    #[test]
    fn test_resolves_every_builtin_name() {
        for d in Dimension::ALL {
            assert_eq!(resolve_dimension(d.name()), Some(d));
        }
        for m in Metric::ALL {
            assert_eq!(resolve_metric(m.name()), Some(m));
        }
        assert_eq!(resolve_dimension("cashier"), None);
        assert_eq!(resolve_metric("margin_rate"), None);
    }

    #[test]
    fn test_parse_requested_metric() {
        assert_eq!(
            parse_requested_metric("turnover"),
            Some(RequestedMetric::Base(Metric::Turnover))
        );
        assert_eq!(
            parse_requested_metric("turnover_diff_percent"),
            Some(RequestedMetric::Derived(Metric::Turnover, DerivedKind::DiffPercent))
        );
        assert_eq!(
            parse_requested_metric("avg_check_diff"),
            Some(RequestedMetric::Derived(Metric::AvgCheck, DerivedKind::Diff))
        );
        assert_eq!(
            parse_requested_metric("profit_prev"),
            Some(RequestedMetric::Derived(Metric::Profit, DerivedKind::Prev))
        );
        assert_eq!(parse_requested_metric("bogus_diff"), None);
        assert_eq!(
            parse_requested_metric("turnover_diff").map(|m| m.column_name()),
            Some("turnover_diff".to_string())
        );
    }

    #[test]
    fn test_has_comparison_suffix() {
        assert!(has_comparison_suffix("turnover_diff"));
        assert!(has_comparison_suffix("bogus_prev"));
        assert!(!has_comparison_suffix("turnover"));
    }

    #[test]
    fn test_calendar_projections() {
        // Tuesday 2024-03-05 10:30 UTC
        let line = line_at(2024, 3, 5, 10);
        let date = |y, m, d| Value::Date(chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap());

        assert_eq!(Dimension::DayMonthYear.project(&line), date(2024, 3, 5));
        assert_eq!(Dimension::DayOfWeek.project(&line), Value::Int(3));
        assert_eq!(Dimension::Month.project(&line), Value::Int(3));
        assert_eq!(Dimension::MonthYear.project(&line), date(2024, 3, 1));
        assert_eq!(Dimension::Quarter.project(&line), Value::Int(1));
        assert_eq!(Dimension::QuarterYear.project(&line), date(2024, 1, 1));
        assert_eq!(Dimension::Year.project(&line), Value::Int(2024));
        assert_eq!(Dimension::Hour.project(&line), Value::Int(10));

        let autumn = line_at(2023, 11, 19, 23);
        assert_eq!(Dimension::Quarter.project(&autumn), Value::Int(4));
        assert_eq!(Dimension::QuarterYear.project(&autumn), date(2023, 10, 1));
        // 2023-11-19 is a Sunday
        assert_eq!(Dimension::DayOfWeek.project(&autumn), Value::Int(1));
    }

    #[test]
    fn test_plan_collapses_duplicates_and_drops_unknown() {
        let plan = QueryPlan::resolve(
            &["shop_name", "cashier", "shop_name", "month"],
            &["turnover_diff", "turnover", "nope", "turnover_diff", "profit_prev"],
        );
        assert_eq!(plan.dimensions, vec![Dimension::ShopName, Dimension::Month]);
        assert_eq!(
            plan.metric_columns(),
            vec!["turnover_diff", "turnover", "profit_prev"]
        );
        assert_eq!(plan.base_metrics, vec![Metric::Turnover, Metric::Profit]);
        assert!(plan.metrics[0].is_derived());
    }

    #[test]
    fn test_catalog_lists_everything() {
        let catalog = registry().catalog();
        assert_eq!(catalog.dimensions.len(), Dimension::ALL.len());
        assert_eq!(catalog.metrics.len(), Metric::ALL.len());
        assert_eq!(catalog.derived_suffixes, vec!["_prev", "_diff", "_diff_percent"]);
    }
}
