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

//! Point-of-sale entities
//!
//! Brands, shops and products are reference data. Receipts and their cart
//! items are the facts. A [`TransactionLine`] is a cart item resolved against
//! its product, brand, receipt and shop, which is the only shape the
//! aggregation engine reads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    /// Products may be sold without a brand
    #[serde(default)]
    pub brand_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: u64,
    pub datetime: DateTime<Utc>,
    pub shop_id: u64,
    pub total_price: Decimal,
    pub margin_price_total: Decimal,
    #[serde(default)]
    pub refund: bool,
}

/// One sold line item of a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: u64,
    pub receipt_id: u64,
    pub product_id: u64,
    pub price: Decimal,
    pub original_price: Decimal,
    pub qty: Decimal,
    pub total_price: Decimal,
    pub margin_price_total: Decimal,
    pub datetime: DateTime<Utc>,
}

/// A cart item joined with everything the dimensions project from
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionLine {
    pub receipt_id: u64,
    pub product_id: u64,
    pub product_name: String,
    pub brand_name: Option<String>,
    pub shop_name: String,
    pub datetime: DateTime<Utc>,
    pub price: Decimal,
    pub original_price: Decimal,
    pub qty: Decimal,
    pub total_price: Decimal,
    pub margin_price_total: Decimal,
}

impl TransactionLine {
    /// True when the line's product carries a non-empty brand name
    pub fn is_branded(&self) -> bool {
        self.brand_name
            .as_deref()
            .map_or(false, |name| !name.is_empty())
    }
}
