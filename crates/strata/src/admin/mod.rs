//! Admin HTTP surface
//!
//! A small axum router for health checks, statistics and direct record
//! access on a running daemon.

pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::{Result, StrataError};
use crate::memory::types::{MemoryRecord, StorageTier};
use crate::search::{FusionSearchEngine, SearchStats};
use crate::storage::{SchedulerStats, TierScheduler, TierStore, TierStoreStats};

/// Shared state for the admin handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TierStore>,
    pub scheduler: Option<Arc<TierScheduler>>,
    pub search: Option<Arc<FusionSearchEngine>>,
}

impl AppState {
    pub fn new(store: Arc<TierStore>) -> Self {
        Self {
            store,
            scheduler: None,
            search: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<TierScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_search(mut self, search: Arc<FusionSearchEngine>) -> Self {
        self.search = Some(search);
        self
    }
}

/// Everything `GET /stats` reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub store: TierStoreStats,
    pub scheduler: Option<SchedulerStats>,
    pub search: Option<SearchStats>,
}

/// A stored record together with the tier holding it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub tier: StorageTier,
    #[serde(flatten)]
    pub record: MemoryRecord,
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route("/records", post(handlers::store_handler))
        .route("/records/{id}", get(handlers::get_record_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin router until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| StrataError::General(format!("Failed to bind admin server to {addr}: {e}")))?;

    tracing::info!("Admin server listening on {addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| StrataError::General(format!("Admin server error: {e}")))?;

    tracing::info!("Admin server shut down gracefully");
    Ok(())
}
