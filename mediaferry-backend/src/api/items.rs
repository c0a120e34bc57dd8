//! Item listing, lookup and management endpoints

use crate::db::{ItemFilter, SortOrder};
use crate::error::{ApiError, ApiResult};
use crate::services::ServiceKind;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use mediaferry_common::media::{ItemKind, MediaItem, State as ItemState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    pub limit: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub state: Option<String>,
    pub sort: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub success: bool,
    pub items: Vec<Value>,
    pub page: u32,
    pub limit: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct EpisodeQuery {
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemsRequest {
    #[serde(default)]
    pub imdb_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    pub item_id: Option<String>,
    pub imdb_id: Option<String>,
}

fn parse_positive(name: &str, value: Option<&str>, default: u32) -> ApiResult<u32> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match value.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ApiError::BadRequest(format!("{} must be a positive integer", name))),
    }
}

/// Kinds a stored root can have; seasons and episodes only live inside shows
const LISTABLE_KINDS: [ItemKind; 3] = [ItemKind::Movie, ItemKind::Show, ItemKind::Requested];

fn valid_kinds() -> String {
    LISTABLE_KINDS
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn valid_states() -> String {
    ItemState::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a store filter from raw query parameters
pub fn parse_filter(query: &ItemsQuery) -> ApiResult<ItemFilter> {
    let limit = parse_positive("limit", query.limit.as_deref(), 50)?;
    let page = parse_positive("page", query.page.as_deref(), 1)?;

    let kind = match query.kind.as_deref().filter(|v| !v.is_empty()) {
        Some(value) => Some(
            value
                .parse::<ItemKind>()
                .ok()
                .filter(|kind| LISTABLE_KINDS.contains(kind))
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("Invalid type: {}. Valid types are: {}", value, valid_kinds()))
                })?,
        ),
        None => None,
    };
    let state = match query.state.as_deref().filter(|v| !v.is_empty()) {
        Some(value) => Some(value.parse::<ItemState>().map_err(|e| {
            ApiError::BadRequest(format!("{}. Valid states are: {}", e, valid_states()))
        })?),
        None => None,
    };
    let sort = match query.sort.as_deref().filter(|v| !v.is_empty()) {
        Some(value) => value.parse::<SortOrder>().map_err(ApiError::BadRequest)?,
        None => SortOrder::default(),
    };

    Ok(ItemFilter {
        kind,
        state,
        search: query.search.clone().filter(|s| !s.is_empty()),
        sort,
        page,
        limit,
    })
}

/// GET /items
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<ItemsResponse>> {
    let filter = parse_filter(&query)?;

    if let Some(imdb_id) = filter.search.as_deref().filter(|s| s.starts_with("tt")) {
        let item = state
            .store
            .get_by_imdb(imdb_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Item with IMDb id {} not found", imdb_id)))?;
        return Ok(Json(ItemsResponse {
            success: true,
            items: vec![item.to_summary()],
            page: 1,
            limit: filter.limit,
            total_items: 1,
            total_pages: 1,
        }));
    }

    let (items, total_items) = state.store.list(&filter).await?;
    let total_pages = total_items.div_ceil(filter.limit as u64);

    Ok(Json(ItemsResponse {
        success: true,
        items: items.iter().map(MediaItem::to_summary).collect(),
        page: filter.page,
        limit: filter.limit,
        total_items,
        total_pages,
    }))
}

/// GET /items/states
pub async fn states() -> Json<Value> {
    let states: Vec<&str> = ItemState::ALL.iter().map(|s| s.as_str()).collect();
    Json(json!({"success": true, "states": states}))
}

/// GET /items/extended/:item_id
pub async fn extended_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let item = state
        .store
        .get(&item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Item {} not found", item_id)))?;
    Ok(Json(json!({"success": true, "item": item.to_extended()})))
}

/// GET /items/incomplete
pub async fn incomplete_items(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let items: Vec<Value> = state
        .store
        .incomplete()
        .await?
        .iter()
        .map(MediaItem::to_summary)
        .collect();
    Ok(Json(json!({"success": true, "incomplete_items": items})))
}

/// GET /items/imdb/:imdb_id
///
/// `?season=` narrows to a season, `?season=&episode=` to an episode.
pub async fn imdb_item(
    State(state): State<AppState>,
    Path(imdb_id): Path<String>,
    Query(query): Query<EpisodeQuery>,
) -> ApiResult<Json<Value>> {
    if query.episode.is_some() && query.season.is_none() {
        return Err(ApiError::BadRequest(
            "episode requires a season".to_string(),
        ));
    }

    let item = state
        .store
        .get_by_imdb(&imdb_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Item with IMDb id {} not found", imdb_id)))?;

    let Some(season_number) = query.season else {
        return Ok(Json(json!({"success": true, "item": item.to_extended()})));
    };
    let season = item
        .child(season_number)
        .filter(|_| item.kind == ItemKind::Show)
        .ok_or_else(|| ApiError::NotFound(format!("Season {} not found", season_number)))?;

    let Some(episode_number) = query.episode else {
        return Ok(Json(json!({"success": true, "item": season.to_extended()})));
    };
    let episode = season
        .child(episode_number)
        .ok_or_else(|| ApiError::NotFound(format!("Episode {} not found", episode_number)))?;
    Ok(Json(json!({"success": true, "item": episode.to_extended()})))
}

async fn queue_imdb_ids(state: &AppState, ids: &[String]) -> ApiResult<Json<Value>> {
    let valid: Vec<&String> = ids.iter().filter(|id| id.starts_with("tt")).collect();
    if valid.is_empty() {
        return Err(ApiError::BadRequest("No valid IMDb ids provided".to_string()));
    }

    let mut added = Vec::new();
    for imdb_id in valid {
        let item = MediaItem::requested(imdb_id, "manual");
        if state.program.add_to_queue(item, ServiceKind::Manual).await {
            added.push(imdb_id.clone());
        }
    }
    info!(requested = ids.len(), added = added.len(), "Added items from API");

    Ok(Json(json!({
        "success": true,
        "message": format!("Added {} item(s) to the queue", added.len()),
        "added": added,
    })))
}

/// POST /items/add/imdb/:imdb_id
pub async fn add_imdb_item(
    State(state): State<AppState>,
    Path(imdb_id): Path<String>,
) -> ApiResult<Json<Value>> {
    queue_imdb_ids(&state, &[imdb_id]).await
}

/// POST /items/add/imdb
pub async fn add_imdb_items(
    State(state): State<AppState>,
    Json(request): Json<AddItemsRequest>,
) -> ApiResult<Json<Value>> {
    queue_imdb_ids(&state, &request.imdb_ids).await
}

/// DELETE /items/remove?item_id=|imdb_id=
pub async fn remove_item(
    State(state): State<AppState>,
    Query(query): Query<RemoveQuery>,
) -> ApiResult<Json<Value>> {
    let item_id = match (query.item_id, query.imdb_id) {
        (Some(item_id), _) => item_id,
        (None, Some(imdb_id)) => state
            .store
            .get_by_imdb(&imdb_id)
            .await?
            .map(|item| item.item_id)
            .ok_or_else(|| ApiError::NotFound(format!("Item with IMDb id {} not found", imdb_id)))?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "item_id or imdb_id is required".to_string(),
            ))
        }
    };

    if !state.program.remove_item(&item_id).await? {
        return Err(ApiError::NotFound(format!("Item {} not found", item_id)));
    }
    Ok(Json(json!({"success": true, "message": format!("Removed {}", item_id)})))
}

/// POST /items/:item_id/retry
pub async fn retry_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.program.retry_item(&item_id).await? {
        return Err(ApiError::NotFound(format!("Item {} not found", item_id)));
    }
    Ok(Json(json!({"success": true, "message": format!("Retrying {}", item_id)})))
}

/// POST /items/:item_id/reset
pub async fn reset_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.program.reset_item(&item_id).await? {
        return Err(ApiError::NotFound(format!("Item {} not found", item_id)));
    }
    Ok(Json(json!({"success": true, "message": format!("Reset {}", item_id)})))
}

pub fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items))
        .route("/items/states", get(states))
        .route("/items/incomplete", get(incomplete_items))
        .route("/items/extended/:item_id", get(extended_item))
        .route("/items/imdb/:imdb_id", get(imdb_item))
        .route("/items/add/imdb", post(add_imdb_items))
        .route("/items/add/imdb/:imdb_id", post(add_imdb_item))
        .route("/items/remove", delete(remove_item))
        .route("/items/:item_id/retry", post(retry_item))
        .route("/items/:item_id/reset", post(reset_item))
}
