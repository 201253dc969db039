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

//! Retailpivot Core
//!
//! Point-of-sale data model, date ranges and the result table shape shared by
//! the storage, query and server crates.

pub mod error;
pub mod model;
pub mod range;
pub mod source;
pub mod table;

pub use error::{Result, RetailPivotError};
pub use model::{Brand, CartItem, Product, Receipt, Shop, TransactionLine};
pub use range::DateRange;
pub use source::TransactionSource;
pub use table::{ResultTable, Value};
