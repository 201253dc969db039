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

//! Grouped and total aggregation over transaction lines
//!
//! Money and quantities are summed as exact decimals and only cast to `f64`
//! when the result table is built.

use retailpivot_core::{ResultTable, TransactionLine, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

use crate::registry::{Dimension, Metric};

/// Running totals for one group
#[derive(Debug, Clone, Default)]
pub struct GroupAccumulator {
    lines: u64,
    turnover: Decimal,
    profit: Decimal,
    qty: Decimal,
    receipts: HashSet<u64>,
    products: HashSet<u64>,
}

impl GroupAccumulator {
    pub fn add(&mut self, line: &TransactionLine) {
        self.lines += 1;
        self.turnover += line.total_price;
        self.profit += line.margin_price_total;
        self.qty += line.qty;
        self.receipts.insert(line.receipt_id);
        self.products.insert(line.product_id);
    }

    fn sum(&self, value: Decimal) -> Option<Decimal> {
        (self.lines > 0).then_some(value)
    }

    pub fn turnover(&self) -> Option<Decimal> {
        self.sum(self.turnover)
    }

    pub fn profit(&self) -> Option<Decimal> {
        self.sum(self.profit)
    }

    pub fn sales_qty(&self) -> Option<Decimal> {
        self.sum(self.qty)
    }

    pub fn checks_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn unique_products(&self) -> usize {
        self.products.len()
    }

    fn metric_values(&self, metrics: &[Metric]) -> Vec<Value> {
        metrics
            .iter()
            .map(|m| Value::from(m.evaluate(self).and_then(|v| v.to_f64())))
            .collect()
    }
}

/// Aggregate `lines` into a result table
///
/// With dimensions (and without `as_total`) lines are grouped by the tuple
/// of their dimension values and rows come out in ascending key order.
/// Otherwise a single row is computed over every line, and dropped when all
/// of its metric values are null. Requesting `brand_name` drops unbranded
/// lines, for totals as well, so a total always matches its brand rows.
/// No metrics means nothing to compute: the table is empty.
pub fn aggregate_lines(
    lines: &[TransactionLine],
    dimensions: &[Dimension],
    metrics: &[Metric],
    as_total: bool,
) -> ResultTable {
    if metrics.is_empty() {
        return ResultTable::empty();
    }

    let branded_only = dimensions.contains(&Dimension::BrandName);
    let kept = lines
        .iter()
        .filter(|line| !branded_only || line.is_branded());

    let metric_columns = metrics.iter().map(|m| m.name().to_string());

    if as_total || dimensions.is_empty() {
        let mut acc = GroupAccumulator::default();
        kept.for_each(|line| acc.add(line));

        let mut table = ResultTable::new(metric_columns.collect());
        let values = acc.metric_values(metrics);
        if values.iter().any(|v| !v.is_null()) {
            table.push_row(values);
        }
        return table;
    }

    let mut groups: BTreeMap<Vec<Value>, GroupAccumulator> = BTreeMap::new();
    for line in kept {
        let key = dimensions.iter().map(|d| d.project(line)).collect();
        groups.entry(key).or_default().add(line);
    }

    let columns = dimensions
        .iter()
        .map(|d| d.name().to_string())
        .chain(metric_columns)
        .collect();
    let mut table = ResultTable::new(columns);
    for (key, acc) in groups {
        let mut row = key;
        row.extend(acc.metric_values(metrics));
        table.push_row(row);
    }
    table
}
