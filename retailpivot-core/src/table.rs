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

//! Result tables
//!
//! A [`ResultTable`] is an ordered list of rows sharing one ordered column
//! list. It serializes as a JSON array of objects whose keys keep the column
//! order, which is what the JSON responder hands back to callers.

use chrono::NaiveDate;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single cell
///
/// Dimension cells keep their native type (text, integer, date). Metric cells
/// are always `Float` or `Null`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Date(NaiveDate),
    Text(String),
    Float(f64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell, used by diff arithmetic and chart scaling
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::Date(_) => 2,
            Value::Text(_) => 3,
            Value::Float(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Int(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Text(v) => f.write_str(v),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Date(v) => serializer.collect_str(&v.format("%Y-%m-%d")),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Value::Null, Value::Float)
    }
}

/// Ordered rows of named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// A table with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a row; `values` must follow the column order
    pub fn push_row(&mut self, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(values);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        self.rows.get(index).map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// Project onto `columns` in the given order, skipping names the table
    /// does not have
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> ResultTable {
        let picked: Vec<(String, usize)> = columns
            .iter()
            .filter_map(|c| {
                self.column_index(c.as_ref())
                    .map(|idx| (c.as_ref().to_string(), idx))
            })
            .collect();

        ResultTable {
            columns: picked.iter().map(|(name, _)| name.clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| picked.iter().map(|(_, idx)| row[*idx].clone()).collect())
                .collect(),
        }
    }

    /// Stable sort of rows by the given key columns, ascending
    pub fn sort_by_columns<S: AsRef<str>>(&mut self, columns: &[S]) {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c.as_ref()))
            .collect();
        if indices.is_empty() {
            return;
        }
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| a[i].cmp(&b[i]))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }
}

impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.iter() {
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        let mut table = ResultTable::new(vec!["shop_name".into(), "turnover".into()]);
        table.push_row(vec!["North".into(), Value::Float(20.0)]);
        table.push_row(vec!["Central".into(), Value::Float(150.0)]);
        table
    }

    #[test]
    fn test_serializes_rows_in_column_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"[{"shop_name":"North","turnover":20.0},{"shop_name":"Central","turnover":150.0}]"#
        );
    }

    #[test]
    fn test_select_reorders_and_skips_missing() {
        let projected = sample().select(&["turnover", "missing", "shop_name"]);
        assert_eq!(projected.columns(), &["turnover", "shop_name"]);
        assert_eq!(projected.value(1, "shop_name"), Some(&Value::from("Central")));
    }

    #[test]
    fn test_sort_by_columns() {
        let mut table = sample();
        table.sort_by_columns(&["shop_name"]);
        assert_eq!(table.value(0, "shop_name"), Some(&Value::from("Central")));
    }

    #[test]
    fn test_date_and_null_serialization() {
        let mut table = ResultTable::new(vec!["day_month_year".into(), "avg_check".into()]);
        table.push_row(vec![
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
            Value::Null,
        ]);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"[{"day_month_year":"2024-03-05","avg_check":null}]"#);
    }
}
