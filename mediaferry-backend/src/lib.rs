//! mediaferry-backend library
//!
//! Media request pipeline: content services feed requested items through
//! indexing, scraping, Real-Debrid, symlinking and Plex refreshes. The HTTP
//! API exposes the item store, settings and an SSE event stream.

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use mediaferry_common::events::EventBus;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod db;
pub mod error;
pub mod http;
pub mod parser;
pub mod program;
pub mod services;
pub mod settings;

pub use error::{ApiError, ApiResult};

use db::MediaStore;
use program::Program;
use settings::SettingsManager;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub program: Arc<Program>,
    pub settings: Arc<SettingsManager>,
    pub store: MediaStore,
    pub bus: EventBus,
    /// Server start time, for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            settings: Arc::clone(program.settings()),
            store: program.store().clone(),
            bus: program.bus().clone(),
            program,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::default_routes())
        .merge(api::item_routes())
        .merge(api::settings_routes())
        .merge(api::webhook_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
