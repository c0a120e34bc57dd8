//! Health, service status, queue and account endpoints

use crate::error::ApiResult;
use crate::program::QueueSnapshot;
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since the server started
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ServicesResponse {
    pub success: bool,
    pub data: BTreeMap<&'static str, bool>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub success: bool,
    #[serde(flatten)]
    pub queue: QueueSnapshot,
}

/// GET / and GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        success: true,
        message: "MediaFerry is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// GET /user
///
/// Real-Debrid account details; 503 when Real-Debrid is not configured or
/// unreachable.
pub async fn user(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let services = state.program.services().await;
    let mut user = services.downloader.user().await?;
    match &mut user {
        Value::Object(map) => {
            map.insert("success".to_string(), Value::Bool(true));
        }
        other => {
            let data = other.take();
            *other = json!({"success": true, "data": data});
        }
    }
    Ok(Json(user))
}

/// GET /services
pub async fn services(State(state): State<AppState>) -> Json<ServicesResponse> {
    let services = state.program.services().await;
    Json(ServicesResponse {
        success: true,
        data: services.status(),
    })
}

/// GET /queue
pub async fn queue(State(state): State<AppState>) -> Json<QueueResponse> {
    Json(QueueResponse {
        success: true,
        queue: state.program.queue_snapshot().await,
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = state.store.stats().await?;
    Ok(Json(json!({"success": true, "data": stats})))
}

pub fn default_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/user", get(user))
        .route("/services", get(services))
        .route("/queue", get(queue))
        .route("/stats", get(stats))
}
