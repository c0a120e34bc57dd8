//! Integration tests for the HTTP API
//!
//! Each test builds the full router over an in-memory database and a
//! temporary settings file. The program loop is not started, so queued items
//! stay in the queue where `/queue` can see them.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use mediaferry_backend::db::MediaStore;
use mediaferry_backend::program::Program;
use mediaferry_backend::settings::SettingsManager;
use mediaferry_backend::{build_router, AppState};
use mediaferry_common::db::create_tables;
use mediaferry_common::events::EventBus;
use mediaferry_common::media::MediaItem;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

struct TestApp {
    _dir: TempDir,
    state: AppState,
    router: Router,
}

async fn setup_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let settings = Arc::new(SettingsManager::open(dir.path().join("settings.json")).unwrap());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_tables(&pool).await.unwrap();

    let program = Program::new(settings, MediaStore::new(pool), EventBus::new(32))
        .await
        .unwrap();
    let state = AppState::new(program);
    TestApp {
        _dir: dir,
        router: build_router(state.clone()),
        state,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Should parse JSON")
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(test_request("GET", uri)).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn seed_movies(&self) {
        for (i, (imdb_id, title)) in [
            ("tt0133093", "The Matrix"),
            ("tt0234215", "The Matrix Reloaded"),
            ("tt0242653", "The Matrix Revolutions"),
        ]
        .iter()
        .enumerate()
        {
            let mut movie = MediaItem::movie(imdb_id);
            movie.title = Some(title.to_string());
            movie.requested_at = Some(Utc::now() - Duration::days(i as i64));
            self.state.store.upsert(&movie).await.unwrap();
        }
    }
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Default routes
// =============================================================================

#[tokio::test]
async fn test_health_and_root() {
    let app = setup_app().await;

    for uri in ["/", "/health"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["uptime_seconds"].is_u64());
    }
}

#[tokio::test]
async fn test_services_lists_status() {
    let app = setup_app().await;

    let (status, body) = app.get("/services").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"].is_object());
    assert_eq!(body["data"]["real_debrid"], false);
}

#[tokio::test]
async fn test_user_without_real_debrid_is_unavailable() {
    let app = setup_app().await;

    let (status, body) = app.get("/user").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn test_stats_counts_items() {
    let app = setup_app().await;
    app.seed_movies().await;

    let (status, body) = app.get("/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_items"], 3);
    assert_eq!(body["data"]["by_kind"]["movie"], 3);
}

#[tokio::test]
async fn test_events_is_an_sse_stream() {
    let app = setup_app().await;

    let response = app.router.clone().oneshot(test_request("GET", "/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

// =============================================================================
// Items
// =============================================================================

#[tokio::test]
async fn test_items_pagination() {
    let app = setup_app().await;
    app.seed_movies().await;

    let (status, body) = app.get("/items?limit=2&page=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 3);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["imdb_id"], "tt0133093");

    let (_, body) = app.get("/items?limit=2&page=2&sort=desc").await;
    assert_eq!(body["page"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["imdb_id"], "tt0242653");

    let (_, body) = app.get("/items?search=reloaded").await;
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["items"][0]["title"], "The Matrix Reloaded");
}

#[tokio::test]
async fn test_items_rejects_invalid_parameters() {
    let app = setup_app().await;

    for uri in ["/items?page=0", "/items?limit=0", "/items?limit=abc", "/items?sort=sideways"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
    }

    let (status, body) = app.get("/items?state=Finished").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("Valid states are"));
    assert!(message.contains("PartiallyCompleted"));

    for uri in ["/items?type=album", "/items?type=season", "/items?type=episode"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"]["message"].as_str().unwrap().contains("Valid types are: movie, show"));
    }
}

#[tokio::test]
async fn test_items_search_by_imdb_id() {
    let app = setup_app().await;
    app.seed_movies().await;

    let (status, body) = app.get("/items?search=tt0234215").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["items"][0]["item_id"], "tt0234215");

    let (status, _) = app.get("/items?search=tt9999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_item_states() {
    let app = setup_app().await;

    let (status, body) = app.get("/items/states").await;
    assert_eq!(status, StatusCode::OK);
    let states = body["states"].as_array().unwrap();
    assert_eq!(states.len(), 9);
    assert!(states.contains(&json!("Completed")));
}

#[tokio::test]
async fn test_extended_and_incomplete_items() {
    let app = setup_app().await;
    app.seed_movies().await;

    let (status, body) = app.get("/items/extended/tt0133093").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["title"], "The Matrix");
    assert!(body["item"]["streams"].is_array());

    let (status, _) = app.get("/items/extended/tt0000001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get("/items/incomplete").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["incomplete_items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_imdb_lookup_with_season_and_episode() {
    let app = setup_app().await;
    let mut show = MediaItem::show("tt0944947");
    show.title = Some("Game of Thrones".to_string());
    let mut season = MediaItem::season(1);
    season.add_child(MediaItem::episode(1));
    season.add_child(MediaItem::episode(2));
    show.add_child(season);
    app.state.store.upsert(&show).await.unwrap();

    let (status, body) = app.get("/items/imdb/tt0944947").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["seasons"].as_array().unwrap().len(), 1);

    let (_, body) = app.get("/items/imdb/tt0944947?season=1").await;
    assert_eq!(body["item"]["episodes"].as_array().unwrap().len(), 2);

    let (status, body) = app.get("/items/imdb/tt0944947?season=1&episode=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["item_id"], "tt0944947/1/2");

    let (status, _) = app.get("/items/imdb/tt0944947?episode=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/items/imdb/tt0944947?season=4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_items_by_imdb_id() {
    let app = setup_app().await;

    let (status, body) = app
        .post_json("/items/add/imdb", json!({"imdb_ids": ["tt0133093", "not-an-id"]}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], json!(["tt0133093"]));

    let (status, body) = app.send(test_request("POST", "/items/add/imdb/tt0234215")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], json!(["tt0234215"]));

    // Already queued
    let (_, body) = app.send(test_request("POST", "/items/add/imdb/tt0234215")).await;
    assert_eq!(body["added"], json!([]));

    let (status, _) = app.post_json("/items/add/imdb", json!({"imdb_ids": ["abc"]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/queue").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_queued"], 2);
    assert_eq!(body["total_running"], 0);
}

#[tokio::test]
async fn test_remove_item() {
    let app = setup_app().await;
    app.seed_movies().await;

    let (status, _) = app.send(test_request("DELETE", "/items/remove")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.send(test_request("DELETE", "/items/remove?item_id=tt0133093")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.state.store.get("tt0133093").await.unwrap().is_none());

    let (status, _) = app.send(test_request("DELETE", "/items/remove?item_id=tt0133093")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(test_request("DELETE", "/items/remove?imdb_id=tt0234215")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.state.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_retry_and_reset_item() {
    let app = setup_app().await;
    app.seed_movies().await;

    let (status, _) = app.send(test_request("POST", "/items/tt0000001/retry")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send(test_request("POST", "/items/tt0000001/reset")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(test_request("POST", "/items/tt0133093/retry")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(test_request("POST", "/items/tt0234215/reset")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/queue").await;
    assert_eq!(body["total_queued"], 2);
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn test_settings_get() {
    let app = setup_app().await;

    let (status, body) = app.get("/settings/get/all").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["debug"], false);
    assert!(body["data"]["plex"].is_object());

    let (status, body) = app.get("/settings/get/debug,plex.url").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["debug"], false);
    assert_eq!(body["data"]["plex"]["url"], "http://localhost:32400");
    assert!(body["data"].get("plex.url").is_none());

    let (status, _) = app.get("/settings/get/no.such.key").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settings_set_saves_to_disk() {
    let app = setup_app().await;
    let mut events = app.state.bus.subscribe();

    let (status, _) = app
        .post_json("/settings/set", json!({"key": "debug", "value": true}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.state.settings.current().debug);

    let on_disk = std::fs::read_to_string(app.state.settings.path()).unwrap();
    let on_disk: Value = serde_json::from_str(&on_disk).unwrap();
    assert_eq!(on_disk["debug"], true);

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type(), "SettingsChanged");

    let (status, _) = app
        .post_json(
            "/settings/set",
            json!([
                {"key": "plex.url", "value": "http://plex:32400"},
                {"key": "plex.token", "value": "token"}
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.state.settings.current().plex.url, "http://plex:32400");
}

#[tokio::test]
async fn test_settings_set_rejects_invalid_changes() {
    let app = setup_app().await;

    let (status, _) = app
        .post_json("/settings/set", json!({"key": "no.such.key", "value": 1}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json(
            "/settings/set",
            json!([
                {"key": "plex.url", "value": "http://plex:32400"},
                {"key": "debug", "value": "not a bool"}
            ]),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let current = app.state.settings.current();
    assert!(!current.debug);
    assert_eq!(current.plex.url, "http://localhost:32400");
}

#[tokio::test]
async fn test_settings_load_and_save() {
    let app = setup_app().await;

    let (status, _) = app.send(test_request("POST", "/settings/save")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.state.settings.path().exists());

    let (status, body) = app.get("/settings/load").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn test_overseerr_webhook() {
    let app = setup_app().await;

    let (status, body) = app
        .post_json(
            "/webhook/overseerr",
            json!({"notification_type": "TEST_NOTIFICATION", "subject": "Test"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = app
        .post_json(
            "/webhook/overseerr",
            json!({
                "notification_type": "MEDIA_AUTO_APPROVED",
                "media": {"media_type": "movie", "tmdbId": "603", "imdbId": "tt0133093"}
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imdb_id"], "tt0133093");
    assert_eq!(body["queued"], true);

    let (_, body) = app.get("/queue").await;
    assert_eq!(body["total_queued"], 1);
}
