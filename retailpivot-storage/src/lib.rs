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

//! Retailpivot Storage Layer
//!
//! In-memory store for point-of-sale data with JSON snapshot persistence.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use retailpivot_storage::InMemoryStore;
//!
//! let store = InMemoryStore::open("./retailpivot-data/dataset.json", true)?;
//! let brand = store.create_brand(NewBrand { name: "Lavazza".into() })?;
//! ```
//!
//! The store implements [`retailpivot_core::TransactionSource`], resolving
//! each cart item against its product, brand, receipt and shop.

pub mod dataset;
pub mod error;
pub mod listing;
pub mod store;

pub use dataset::Dataset;
pub use error::StorageError;
pub use listing::{ListQuery, SortOrder};
pub use store::{InMemoryStore, NewBrand, NewCartItem, NewProduct, NewReceipt, NewShop, StoreStats};
