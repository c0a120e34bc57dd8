//! Runtime settings endpoints
//!
//! Every successful change is published by the settings manager, which makes
//! the program rebuild its services.

use crate::error::ApiResult;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use mediaferry_common::events::FerryEvent;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SetSetting {
    pub key: String,
    pub value: Value,
}

/// Body of `POST /settings/set`: one change or a list of changes
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SetSettingsRequest {
    One(SetSetting),
    Many(Vec<SetSetting>),
}

impl SetSettingsRequest {
    fn into_entries(self) -> Vec<(String, Value)> {
        match self {
            SetSettingsRequest::One(s) => vec![(s.key, s.value)],
            SetSettingsRequest::Many(list) => list.into_iter().map(|s| (s.key, s.value)).collect(),
        }
    }
}

/// GET /settings/load
pub async fn load_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.settings.load()?;
    state.bus.emit_lossy(FerryEvent::SettingsChanged {
        keys: vec!["all".to_string()],
        timestamp: Utc::now(),
    });
    Ok(Json(json!({"success": true, "message": "Settings loaded"})))
}

/// POST /settings/save
pub async fn save_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.settings.save()?;
    Ok(Json(json!({"success": true, "message": "Settings saved"})))
}

/// GET /settings/get/all
pub async fn get_all_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let data = state.settings.get_many("all")?;
    Ok(Json(json!({"success": true, "data": data})))
}

/// GET /settings/get/:keys
///
/// `keys` is a comma separated list of dotted keys.
pub async fn get_settings(
    State(state): State<AppState>,
    Path(keys): Path<String>,
) -> ApiResult<Json<Value>> {
    let data = state.settings.get_many(&keys)?;
    Ok(Json(json!({"success": true, "data": data})))
}

/// POST /settings/set
///
/// Invalid keys or values leave the settings untouched and return 400.
pub async fn set_settings(
    State(state): State<AppState>,
    Json(request): Json<SetSettingsRequest>,
) -> ApiResult<Json<Value>> {
    let entries = request.into_entries();
    let keys: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();

    state.settings.set_many(entries)?;
    state.settings.save()?;
    info!(keys = ?keys, "Settings updated");

    state.bus.emit_lossy(FerryEvent::SettingsChanged {
        keys,
        timestamp: Utc::now(),
    });
    Ok(Json(json!({"success": true, "message": "Settings updated"})))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/settings/load", get(load_settings))
        .route("/settings/save", post(save_settings))
        .route("/settings/get/all", get(get_all_settings))
        .route("/settings/get/:keys", get(get_settings))
        .route("/settings/set", post(set_settings))
}
