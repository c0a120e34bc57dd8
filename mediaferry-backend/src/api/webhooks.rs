//! Inbound webhooks

use crate::error::ApiResult;
use crate::services::content::OverseerrMedia;
use crate::services::ServiceKind;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use mediaferry_common::media::MediaItem;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct OverseerrWebhook {
    #[serde(default)]
    pub notification_type: String,
    pub media: Option<OverseerrMedia>,
}

/// POST /webhook/overseerr
pub async fn overseerr(
    State(state): State<AppState>,
    Json(payload): Json<OverseerrWebhook>,
) -> ApiResult<Json<Value>> {
    if payload.notification_type == "TEST_NOTIFICATION" {
        info!("Received test notification from Overseerr");
        return Ok(Json(json!({"success": true, "message": "Test notification received"})));
    }

    let Some(media) = payload.media else {
        debug!(notification = %payload.notification_type, "Overseerr webhook without media");
        return Ok(Json(json!({"success": false, "message": "No media in payload"})));
    };

    let services = state.program.services().await;
    let Some(imdb_id) = services.overseerr.resolve_imdb_id(&media).await else {
        warn!(media = ?media, "Could not resolve an IMDb id for Overseerr request");
        return Ok(Json(json!({"success": false, "message": "Failed to get IMDb id"})));
    };

    let item = MediaItem::requested(&imdb_id, "overseerr");
    let queued = state.program.add_to_queue(item, ServiceKind::Overseerr).await;
    info!(imdb_id = %imdb_id, queued, "Overseerr webhook request");

    Ok(Json(json!({"success": true, "imdb_id": imdb_id, "queued": queued})))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/overseerr", post(overseerr))
}
