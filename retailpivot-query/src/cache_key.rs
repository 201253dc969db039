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

//! Content-addressed cache keys for aggregation results
//!
//! ```text
//! key = "analytics:" || hex(SHA256(json({date_from, date_to, sort(dims), sort(metrics)})))
//! ```
//!
//! Dimension and metric lists are sorted and deduplicated before hashing, so
//! the key does not depend on request order. Totals append [`TOTAL_SENTINEL`]
//! to the dimension list so they never share a key with a grouped query.

use chrono::NaiveDate;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Reserved dimension name marking a totals query
pub const TOTAL_SENTINEL: &str = "__total__";

const KEY_PREFIX: &str = "analytics:";

fn sorted_names<S: AsRef<str>>(names: &[S]) -> Vec<&str> {
    let mut sorted: Vec<&str> = names.iter().map(|n| n.as_ref()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

/// Build the cache key for an aggregation
pub fn make_key<D: AsRef<str>, M: AsRef<str>>(
    date_from: NaiveDate,
    date_to: NaiveDate,
    dimensions: &[D],
    metrics: &[M],
) -> String {
    let canonical = json!({
        "date_from": date_from.format("%Y-%m-%d").to_string(),
        "date_to": date_to.format("%Y-%m-%d").to_string(),
        "dimensions": sorted_names(dimensions),
        "metrics": sorted_names(metrics),
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_key_shape() {
        let key = make_key(day(1), day(31), &["shop_name"], &["turnover"]);
        assert!(key.starts_with("analytics:"));
        assert_eq!(key.len(), "analytics:".len() + 64);
    }

    #[test]
    fn test_key_order_independent() {
        let a = make_key(day(1), day(31), &["shop_name", "brand_name"], &["turnover", "profit"]);
        let b = make_key(day(1), day(31), &["brand_name", "shop_name"], &["profit", "turnover"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_inputs() {
        let base = make_key(day(1), day(31), &["shop_name"], &["turnover"]);
        assert_ne!(base, make_key(day(2), day(31), &["shop_name"], &["turnover"]));
        assert_ne!(base, make_key(day(1), day(30), &["shop_name"], &["turnover"]));
        assert_ne!(base, make_key(day(1), day(31), &["brand_name"], &["turnover"]));
        assert_ne!(base, make_key(day(1), day(31), &["shop_name"], &["profit"]));
        // a dimension name is not interchangeable with a metric name
        assert_ne!(
            make_key(day(1), day(31), &["turnover"], &[] as &[&str]),
            make_key(day(1), day(31), &[] as &[&str], &["turnover"]),
        );
    }

    #[test]
    fn test_total_never_collides_with_grouped() {
        let grouped = make_key(day(1), day(31), &["shop_name"], &["turnover"]);
        let total = make_key(day(1), day(31), &["shop_name", TOTAL_SENTINEL], &["turnover"]);
        assert_ne!(grouped, total);
    }

    proptest! {
        #[test]
        fn prop_permutation_invariant(
            dims in proptest::sample::subsequence(
                vec!["product_name", "brand_name", "shop_name", "month", "year", "hour"], 0..6
            ).prop_shuffle(),
            metrics in proptest::sample::subsequence(
                vec!["turnover", "profit", "sales_qty", "avg_check"], 0..4
            ).prop_shuffle(),
        ) {
            let mut sorted_dims = dims.clone();
            sorted_dims.sort();
            let mut reversed_metrics = metrics.clone();
            reversed_metrics.reverse();

            prop_assert_eq!(
                make_key(day(1), day(31), &dims, &metrics),
                make_key(day(1), day(31), &sorted_dims, &reversed_metrics)
            );
        }
    }
}
