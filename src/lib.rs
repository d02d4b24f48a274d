//! personfinder - person search web service
//!
//! A user submits a name and optional hints; the service searches the web,
//! presents candidate matches for confirmation one at a time, collects
//! detail on the confirmed candidate, and produces a short narrative report
//! through a pluggable LLM backend.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod flow;
pub mod llm;
pub mod models;
pub mod search;

pub use crate::error::{ApiError, ApiResult, Error, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::fetch::TitleFetcher;
use crate::flow::Flow;
use crate::search::SearchClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Process-wide configuration
    pub config: Arc<Config>,
    /// Session pipeline driver
    pub flow: Flow,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the real adapters from configuration
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let search = Arc::new(SearchClient::new(
            config.search_endpoint.clone(),
            config.search_max_results,
            config.request_timeout,
        ));
        let fetcher = Arc::new(TitleFetcher::new(config.request_timeout));
        let generator = llm::init_generator(&config);
        let flow = Flow::new(db.clone(), search, fetcher, generator);

        Self {
            db,
            config: Arc::new(config),
            flow,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::session_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
