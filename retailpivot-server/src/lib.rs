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

//! Retailpivot HTTP server
//!
//! Reference-data CRUD, receipt ingest and the analytics endpoint, with
//! Excel and chart reports delivered by mail from a background queue.

pub mod api;
pub mod config;
pub mod jobs;
pub mod mail;
pub mod report;
pub mod validation;

use anyhow::Result;
use axum::{http::HeaderValue, Router};
use retailpivot_query::{AnalyticsCache, AnalyticsEngine, CacheConfig};
use retailpivot_storage::InMemoryStore;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::{ServerConfig, StorageConfig};
use jobs::{JobContext, JobQueue};
use mail::{create_mailer, DynMailer};

/// Open the configured dataset, or an empty in-memory store
pub fn open_store(config: &StorageConfig) -> Result<InMemoryStore> {
    match &config.dataset_path {
        Some(path) => {
            tracing::info!("Opening dataset at: {:?}", path);
            Ok(InMemoryStore::open(path, config.persist_writes)?)
        }
        None => {
            tracing::info!("No dataset configured, starting with an empty store");
            Ok(InMemoryStore::new())
        }
    }
}

/// Wire the engine, cache and report queue around a store
///
/// Spawns the queue dispatcher, so it must be called inside a tokio runtime.
pub fn build_state(config: &ServerConfig, store: Arc<InMemoryStore>, mailer: DynMailer) -> AppState {
    let cache = Arc::new(AnalyticsCache::new(CacheConfig {
        max_entries: config.cache.max_entries,
    }));
    let engine = AnalyticsEngine::new(store.clone(), cache, config.cache.ttl());

    let (jobs, _dispatcher) = JobQueue::start(
        JobContext {
            engine: engine.clone(),
            mailer,
        },
        config.jobs.queue_capacity,
    );

    AppState {
        store,
        engine,
        jobs,
        started_at: Instant::now(),
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if !config.server.enable_cors {
        return CorsLayer::new();
    }

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.server.cors_origins.is_empty() {
        tracing::warn!("CORS: Allowing all origins (development mode). Set cors_origins in production!");
        return cors.allow_origin(Any);
    }

    tracing::info!("CORS: Allowing origins: {:?}", config.server.cors_origins);
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("CORS: Ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Router with CORS and request tracing applied
pub fn build_app(config: &ServerConfig, state: AppState) -> Router {
    api::router(state)
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "retailpivot_server=info,retailpivot_query=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Retailpivot Server");
    tracing::info!("Configuration: {:#?}", config);

    // Validate configuration
    config.validate()?;
    let addr = config.socket_addr()?;

    let store = Arc::new(open_store(&config.storage)?);
    tracing::info!("Store loaded: {:?}", store.stats());

    let mailer = create_mailer(&config.mail)?;
    if config.mail.enabled {
        tracing::info!(
            "Mail delivery via {}:{}",
            config.mail.smtp_host,
            config.mail.smtp_port
        );
    } else {
        tracing::info!("Mail delivery disabled, reports will only be logged");
    }

    let state = build_state(&config, store, mailer);
    let app = build_app(&config, state);

    tracing::info!("HTTP API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
