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

//! Reference data endpoints: brands, shops, products and receipt ingest
//!
//! Writes may flush the store snapshot to disk, so they run on the blocking
//! pool.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use retailpivot_core::{Brand, CartItem, Product, Receipt, Shop};
use retailpivot_storage::{ListQuery, NewBrand, NewProduct, NewReceipt, NewShop};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiError, AppState};

/// Product listing parameters
///
/// Kept flat rather than flattening `ListQuery`, so `brand_id` parses as a
/// number from the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub brand_id: Option<u64>,
}

impl ProductListParams {
    fn list_query(&self) -> ListQuery {
        ListQuery {
            search: self.search.clone(),
            ordering: self.ordering.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub receipt: Receipt,
    pub items: Vec<CartItem>,
}

/// GET /api/brands/
pub async fn list_brands(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Json<Vec<Brand>> {
    Json(state.store.list_brands(&params))
}

/// POST /api/brands/
pub async fn create_brand(
    State(state): State<AppState>,
    Json(new): Json<NewBrand>,
) -> Result<(StatusCode, Json<Brand>), ApiError> {
    let store = state.store.clone();
    let brand = tokio::task::spawn_blocking(move || store.create_brand(new)).await??;
    info!(id = brand.id, name = %brand.name, "Brand created");
    Ok((StatusCode::CREATED, Json(brand)))
}

/// GET /api/shops/
pub async fn list_shops(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Json<Vec<Shop>> {
    Json(state.store.list_shops(&params))
}

/// POST /api/shops/
pub async fn create_shop(
    State(state): State<AppState>,
    Json(new): Json<NewShop>,
) -> Result<(StatusCode, Json<Shop>), ApiError> {
    let store = state.store.clone();
    let shop = tokio::task::spawn_blocking(move || store.create_shop(new)).await??;
    info!(id = shop.id, name = %shop.name, "Shop created");
    Ok((StatusCode::CREATED, Json(shop)))
}

/// GET /api/products/
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Json<Vec<Product>> {
    Json(state.store.list_products(&params.list_query(), params.brand_id))
}

/// POST /api/products/
pub async fn create_product(
    State(state): State<AppState>,
    Json(new): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let store = state.store.clone();
    let product = tokio::task::spawn_blocking(move || store.create_product(new)).await??;
    info!(id = product.id, name = %product.name, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /api/receipts/
///
/// Ingests a receipt with its cart items.
pub async fn ingest_receipt(
    State(state): State<AppState>,
    Json(new): Json<NewReceipt>,
) -> Result<(StatusCode, Json<ReceiptResponse>), ApiError> {
    let store = state.store.clone();
    let (receipt, items) = tokio::task::spawn_blocking(move || store.ingest_receipt(new)).await??;
    info!(
        id = receipt.id,
        shop_id = receipt.shop_id,
        items = items.len(),
        "Receipt ingested"
    );
    Ok((StatusCode::CREATED, Json(ReceiptResponse { receipt, items })))
}
