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

//! In-memory point-of-sale store
//!
//! All tables live behind one `parking_lot::RwLock`. Reads (listings and
//! transaction scans) never block each other. When a snapshot path is
//! configured every successful write is flushed to disk before the lock is
//! released, so the file always reflects an acknowledged state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use retailpivot_core::{
    Brand, CartItem, DateRange, Product, Receipt, Shop, TransactionLine, TransactionSource,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::error::StorageError;
use crate::listing::{ListQuery, SortOrder};

/// Maximum length of brand, shop and product names
pub const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBrand {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShop {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub brand_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCartItem {
    pub product_id: u64,
    pub price: Decimal,
    /// Defaults to `price`
    #[serde(default)]
    pub original_price: Option<Decimal>,
    pub qty: Decimal,
    /// Defaults to `price * qty`
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub margin_price_total: Decimal,
    /// Defaults to the receipt datetime
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReceipt {
    pub shop_id: u64,
    pub datetime: DateTime<Utc>,
    #[serde(default)]
    pub refund: bool,
    pub items: Vec<NewCartItem>,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub brands: usize,
    pub shops: usize,
    pub products: usize,
    pub receipts: usize,
    pub cart_items: usize,
}

#[derive(Debug, Default)]
struct Tables {
    brands: BTreeMap<u64, Brand>,
    shops: BTreeMap<u64, Shop>,
    products: BTreeMap<u64, Product>,
    receipts: BTreeMap<u64, Receipt>,
    cart_items: BTreeMap<u64, CartItem>,
}

fn next_id<T>(map: &BTreeMap<u64, T>) -> u64 {
    map.keys().next_back().map_or(1, |id| id + 1)
}

fn validate_name(name: &str) -> Result<String, StorageError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidInput("name cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(StorageError::InvalidInput(format!(
            "name too long: {} characters (maximum: {})",
            trimmed.chars().count(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

impl Tables {
    fn from_dataset(dataset: Dataset) -> Self {
        Self {
            brands: dataset.brands.into_iter().map(|b| (b.id, b)).collect(),
            shops: dataset.shops.into_iter().map(|s| (s.id, s)).collect(),
            products: dataset.products.into_iter().map(|p| (p.id, p)).collect(),
            receipts: dataset.receipts.into_iter().map(|r| (r.id, r)).collect(),
            cart_items: dataset.cart_items.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    fn to_dataset(&self) -> Dataset {
        Dataset {
            brands: self.brands.values().cloned().collect(),
            shops: self.shops.values().cloned().collect(),
            products: self.products.values().cloned().collect(),
            receipts: self.receipts.values().cloned().collect(),
            cart_items: self.cart_items.values().cloned().collect(),
        }
    }

    fn resolve(&self, item: &CartItem) -> Option<TransactionLine> {
        let receipt = self.receipts.get(&item.receipt_id)?;
        let shop = self.shops.get(&receipt.shop_id)?;
        let product = self.products.get(&item.product_id)?;
        let brand_name = match product.brand_id {
            Some(brand_id) => Some(self.brands.get(&brand_id)?.name.clone()),
            None => None,
        };

        Some(TransactionLine {
            receipt_id: receipt.id,
            product_id: product.id,
            product_name: product.name.clone(),
            brand_name,
            shop_name: shop.name.clone(),
            datetime: item.datetime,
            price: item.price,
            original_price: item.original_price,
            qty: item.qty,
            total_price: item.total_price,
            margin_price_total: item.margin_price_total,
        })
    }
}

fn sort_named<T: Clone>(
    rows: Vec<&T>,
    field: &str,
    order: SortOrder,
    key: impl Fn(&T, &str) -> (Option<u64>, String),
) -> Vec<T> {
    let mut rows = rows;
    rows.sort_by(|a, b| key(a, field).cmp(&key(b, field)));
    if order == SortOrder::Descending {
        rows.reverse();
    }
    rows.into_iter().cloned().collect()
}

/// Thread-safe point-of-sale store
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Empty store without persistence
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot_path: None,
        }
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        Self {
            tables: RwLock::new(Tables::from_dataset(dataset)),
            snapshot_path: None,
        }
    }

    /// Load the snapshot at `path` if it exists
    ///
    /// With `persist_writes` every write is flushed back to `path`.
    pub fn open(path: impl AsRef<Path>, persist_writes: bool) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let dataset = if path.exists() {
            let dataset = Dataset::load(path)?;
            info!(
                "Loaded dataset from {:?}: {} receipts, {} cart items",
                path,
                dataset.receipts.len(),
                dataset.cart_items.len()
            );
            dataset
        } else {
            warn!("Dataset file not found: {:?}, starting empty", path);
            Dataset::default()
        };

        Ok(Self {
            tables: RwLock::new(Tables::from_dataset(dataset)),
            snapshot_path: persist_writes.then(|| path.to_path_buf()),
        })
    }

    pub fn snapshot(&self) -> Dataset {
        self.tables.read().to_dataset()
    }

    pub fn stats(&self) -> StoreStats {
        let tables = self.tables.read();
        StoreStats {
            brands: tables.brands.len(),
            shops: tables.shops.len(),
            products: tables.products.len(),
            receipts: tables.receipts.len(),
            cart_items: tables.cart_items.len(),
        }
    }

    fn flush(&self, tables: &Tables) -> Result<(), StorageError> {
        if let Some(path) = &self.snapshot_path {
            tables.to_dataset().save(path)?;
            debug!("Snapshot written to {:?}", path);
        }
        Ok(())
    }

    /// Flush, undoing the pending write when the snapshot cannot be saved
    fn commit(
        &self,
        tables: &mut Tables,
        rollback: impl FnOnce(&mut Tables),
    ) -> Result<(), StorageError> {
        if let Err(e) = self.flush(tables) {
            rollback(tables);
            warn!("Snapshot write failed, change rolled back: {}", e);
            return Err(e);
        }
        Ok(())
    }

    pub fn create_brand(&self, new: NewBrand) -> Result<Brand, StorageError> {
        let name = validate_name(&new.name)?;
        let mut tables = self.tables.write();
        let brand = Brand {
            id: next_id(&tables.brands),
            name,
        };
        tables.brands.insert(brand.id, brand.clone());
        self.commit(&mut tables, |t| {
            t.brands.remove(&brand.id);
        })?;
        Ok(brand)
    }

    pub fn create_shop(&self, new: NewShop) -> Result<Shop, StorageError> {
        let name = validate_name(&new.name)?;
        let mut tables = self.tables.write();
        let shop = Shop {
            id: next_id(&tables.shops),
            name,
        };
        tables.shops.insert(shop.id, shop.clone());
        self.commit(&mut tables, |t| {
            t.shops.remove(&shop.id);
        })?;
        Ok(shop)
    }

    pub fn create_product(&self, new: NewProduct) -> Result<Product, StorageError> {
        let name = validate_name(&new.name)?;
        let mut tables = self.tables.write();
        if let Some(brand_id) = new.brand_id {
            if !tables.brands.contains_key(&brand_id) {
                return Err(StorageError::NotFound {
                    kind: "brand",
                    id: brand_id,
                });
            }
        }
        let product = Product {
            id: next_id(&tables.products),
            name,
            brand_id: new.brand_id,
        };
        tables.products.insert(product.id, product.clone());
        self.commit(&mut tables, |t| {
            t.products.remove(&product.id);
        })?;
        Ok(product)
    }

    pub fn list_brands(&self, query: &ListQuery) -> Vec<Brand> {
        let tables = self.tables.read();
        let (field, order) = query.sort_field(&["id", "name"]);
        let rows = tables
            .brands
            .values()
            .filter(|b| query.matches(&b.name))
            .collect();
        sort_named(rows, field, order, |b, f| match f {
            "name" => (None, b.name.clone()),
            _ => (Some(b.id), String::new()),
        })
    }

    pub fn list_shops(&self, query: &ListQuery) -> Vec<Shop> {
        let tables = self.tables.read();
        let (field, order) = query.sort_field(&["id", "name"]);
        let rows = tables
            .shops
            .values()
            .filter(|s| query.matches(&s.name))
            .collect();
        sort_named(rows, field, order, |s, f| match f {
            "name" => (None, s.name.clone()),
            _ => (Some(s.id), String::new()),
        })
    }

    pub fn list_products(&self, query: &ListQuery, brand_id: Option<u64>) -> Vec<Product> {
        let tables = self.tables.read();
        let (field, order) = query.sort_field(&["id", "name", "brand_id"]);
        let rows = tables
            .products
            .values()
            .filter(|p| query.matches(&p.name))
            .filter(|p| brand_id.map_or(true, |id| p.brand_id == Some(id)))
            .collect();
        sort_named(rows, field, order, |p, f| match f {
            "name" => (None, p.name.clone()),
            "brand_id" => (p.brand_id, String::new()),
            _ => (Some(p.id), String::new()),
        })
    }

    /// Store a receipt together with its items
    ///
    /// Receipt totals are the sums of the item totals and margins.
    pub fn ingest_receipt(&self, new: NewReceipt) -> Result<(Receipt, Vec<CartItem>), StorageError> {
        if new.items.is_empty() {
            return Err(StorageError::InvalidInput(
                "a receipt needs at least one item".into(),
            ));
        }

        let mut tables = self.tables.write();
        if !tables.shops.contains_key(&new.shop_id) {
            return Err(StorageError::NotFound {
                kind: "shop",
                id: new.shop_id,
            });
        }
        if let Some(missing) = new
            .items
            .iter()
            .find(|item| !tables.products.contains_key(&item.product_id))
        {
            return Err(StorageError::NotFound {
                kind: "product",
                id: missing.product_id,
            });
        }

        let receipt_id = next_id(&tables.receipts);
        let mut item_id = next_id(&tables.cart_items);
        let mut items = Vec::with_capacity(new.items.len());
        for item in new.items {
            items.push(CartItem {
                id: item_id,
                receipt_id,
                product_id: item.product_id,
                price: item.price,
                original_price: item.original_price.unwrap_or(item.price),
                qty: item.qty,
                total_price: item.total_price.unwrap_or(item.price * item.qty),
                margin_price_total: item.margin_price_total,
                datetime: item.datetime.unwrap_or(new.datetime),
            });
            item_id += 1;
        }

        let receipt = Receipt {
            id: receipt_id,
            datetime: new.datetime,
            shop_id: new.shop_id,
            total_price: items.iter().map(|i| i.total_price).sum(),
            margin_price_total: items.iter().map(|i| i.margin_price_total).sum(),
            refund: new.refund,
        };

        tables.receipts.insert(receipt.id, receipt.clone());
        for item in &items {
            tables.cart_items.insert(item.id, item.clone());
        }
        self.commit(&mut tables, |t| {
            t.receipts.remove(&receipt.id);
            for item in &items {
                t.cart_items.remove(&item.id);
            }
        })?;

        debug!(
            "Ingested receipt {} with {} items",
            receipt.id,
            items.len()
        );
        Ok((receipt, items))
    }
}

impl TransactionSource for InMemoryStore {
    fn lines_between(&self, range: &DateRange) -> retailpivot_core::Result<Vec<TransactionLine>> {
        let tables = self.tables.read();
        let mut lines = Vec::new();
        for item in tables.cart_items.values() {
            if !range.contains(&item.datetime) {
                continue;
            }
            match tables.resolve(item) {
                Some(line) => lines.push(line),
                None => warn!(
                    "Skipping cart item {}: dangling receipt, shop, product or brand reference",
                    item.id
                ),
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        let brand = store.create_brand(NewBrand { name: "Lavazza".into() }).unwrap();
        let shop = store.create_shop(NewShop { name: "Central".into() }).unwrap();
        let branded = store
            .create_product(NewProduct {
                name: "Espresso".into(),
                brand_id: Some(brand.id),
            })
            .unwrap();
        let plain = store
            .create_product(NewProduct {
                name: "Water".into(),
                brand_id: None,
            })
            .unwrap();
        store
            .ingest_receipt(NewReceipt {
                shop_id: shop.id,
                datetime: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
                refund: false,
                items: vec![
                    NewCartItem {
                        product_id: branded.id,
                        price: dec!(75),
                        original_price: None,
                        qty: dec!(2),
                        total_price: None,
                        margin_price_total: dec!(30),
                        datetime: None,
                    },
                    NewCartItem {
                        product_id: plain.id,
                        price: dec!(1.5),
                        original_price: None,
                        qty: dec!(1),
                        total_price: None,
                        margin_price_total: dec!(0.5),
                        datetime: None,
                    },
                ],
            })
            .unwrap();
        store
    }

    fn range(from: (i32, u32, u32), to: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(from.0, from.1, from.2).unwrap(),
            NaiveDate::from_ymd_opt(to.0, to.1, to.2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_ingest_computes_receipt_totals() {
        let store = seeded();
        let dataset = store.snapshot();
        assert_eq!(dataset.receipts.len(), 1);
        assert_eq!(dataset.receipts[0].total_price, dec!(151.5));
        assert_eq!(dataset.receipts[0].margin_price_total, dec!(30.5));
        assert_eq!(dataset.cart_items[0].original_price, dec!(75));
    }

    #[test]
    fn test_lines_between_resolves_names() {
        let store = seeded();
        let lines = store.lines_between(&range((2024, 3, 5), (2024, 3, 5))).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].brand_name.as_deref(), Some("Lavazza"));
        assert_eq!(lines[0].shop_name, "Central");
        assert_eq!(lines[1].brand_name, None);

        let none = store.lines_between(&range((2024, 3, 6), (2024, 3, 31))).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_rejects_unknown_references() {
        let store = seeded();
        let err = store
            .create_product(NewProduct {
                name: "Ghost".into(),
                brand_id: Some(99),
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "brand", id: 99 }));

        let err = store
            .ingest_receipt(NewReceipt {
                shop_id: 42,
                datetime: Utc::now(),
                refund: false,
                items: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[test]
    fn test_listing_search_and_ordering() {
        let store = seeded();
        store.create_brand(NewBrand { name: "Illy".into() }).unwrap();

        let desc = store.list_brands(&ListQuery {
            search: None,
            ordering: Some("-name".into()),
        });
        assert_eq!(desc[0].name, "Lavazza");
        assert_eq!(desc[1].name, "Illy");

        let found = store.list_products(
            &ListQuery {
                search: Some("ESP".into()),
                ordering: None,
            },
            None,
        );
        assert_eq!(found.len(), 1);

        let by_brand = store.list_products(&ListQuery::default(), Some(1));
        assert_eq!(by_brand.len(), 1);
        assert_eq!(by_brand[0].name, "Espresso");
    }

    #[test]
    fn test_rejects_blank_names() {
        let store = InMemoryStore::new();
        assert!(store.create_shop(NewShop { name: "   ".into() }).is_err());
        assert!(store
            .create_shop(NewShop {
                name: "x".repeat(MAX_NAME_LENGTH + 1)
            })
            .is_err());
    }

    #[test]
    fn test_failed_snapshot_write_leaves_no_row() {
        // the snapshot's parent is a regular file, so every save fails
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = InMemoryStore {
            tables: RwLock::new(Tables::from_dataset(seeded().snapshot())),
            snapshot_path: Some(blocker.join("dataset.json")),
        };
        let before = store.stats();

        for _ in 0..2 {
            assert!(store.create_shop(NewShop { name: "Harbour".into() }).is_err());
        }
        assert!(store.create_brand(NewBrand { name: "Illy".into() }).is_err());
        assert!(store
            .create_product(NewProduct {
                name: "Ristretto".into(),
                brand_id: None,
            })
            .is_err());
        let ingest = store.ingest_receipt(NewReceipt {
            shop_id: 1,
            datetime: Utc.with_ymd_and_hms(2024, 3, 20, 18, 0, 0).unwrap(),
            refund: false,
            items: vec![NewCartItem {
                product_id: 1,
                price: dec!(5),
                original_price: None,
                qty: dec!(1),
                total_price: None,
                margin_price_total: dec!(1),
                datetime: None,
            }],
        });
        assert!(ingest.is_err());

        assert_eq!(store.stats(), before);
    }

    #[test]
    fn test_persisted_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");

        let store = InMemoryStore::open(&path, true).unwrap();
        store.create_shop(NewShop { name: "Central".into() }).unwrap();
        assert!(path.exists());

        let reopened = InMemoryStore::open(&path, false).unwrap();
        assert_eq!(reopened.stats().shops, 1);
        assert_eq!(reopened.list_shops(&ListQuery::default())[0].name, "Central");
    }
}
