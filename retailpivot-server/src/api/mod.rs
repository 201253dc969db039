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

pub mod analytics;
pub mod health;
pub mod reference;

pub use analytics::{get_analytics, get_catalog};
pub use health::health_check;
pub use reference::{
    create_brand, create_product, create_shop, ingest_receipt, list_brands, list_products,
    list_shops,
};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use retailpivot_core::RetailPivotError;
use retailpivot_query::AnalyticsEngine;
use retailpivot_storage::{InMemoryStore, StorageError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::jobs::{JobError, JobQueue};
use crate::validation::ValidationErrors;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::Validation(errors) => {
                return (StatusCode::BAD_REQUEST, Json(ValidationResponse { errors }))
                    .into_response();
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct ValidationResponse {
    errors: ValidationErrors,
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StorageError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<RetailPivotError> for ApiError {
    fn from(err: RetailPivotError) -> Self {
        match err {
            RetailPivotError::NotFound(msg) => ApiError::NotFound(msg),
            RetailPivotError::InvalidArgument(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Task failed: {}", err))
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InMemoryStore>,
    pub engine: AnalyticsEngine,
    pub jobs: JobQueue,
    pub started_at: Instant,
}

/// All routes, without middleware layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/brands/", get(list_brands).post(create_brand))
        .route("/api/shops/", get(list_shops).post(create_shop))
        .route("/api/products/", get(list_products).post(create_product))
        .route("/api/receipts/", post(ingest_receipt))
        .route("/api/analytics/catalog/", get(get_catalog))
        .route("/api/analytics/get-analytics/", post(get_analytics))
        .with_state(state)
}
