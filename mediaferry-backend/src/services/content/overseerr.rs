use super::is_imdb_id;
use crate::error::ServiceError;
use crate::http::check_status;
use crate::services::{ContentService, ServiceKind};
use crate::settings::OverseerrSettings;
use async_trait::async_trait;
use mediaferry_common::MediaItem;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The `media` object of an Overseerr request or webhook payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverseerrMedia {
    pub id: Option<i64>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<serde_json::Value>,
    pub tvdb_id: Option<serde_json::Value>,
    #[serde(alias = "media_type")]
    pub media_type: Option<String>,
}

impl OverseerrMedia {
    fn id_string(value: &Option<serde_json::Value>) -> Option<String> {
        match value.as_ref()? {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// (path segment, id) used to look up the IMDb id
    fn external_lookup(&self) -> Option<(&'static str, String)> {
        match self.media_type.as_deref() {
            Some("tv") | Some("show") => Some(("tv", Self::id_string(&self.tvdb_id)?)),
            _ => Some(("movie", Self::id_string(&self.tmdb_id)?)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RequestPage {
    #[serde(default)]
    results: Vec<RequestEntry>,
}

#[derive(Debug, Deserialize)]
struct RequestEntry {
    #[serde(default)]
    media: OverseerrMedia,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MediaDetails {
    external_ids: ExternalIds,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExternalIds {
    imdb_id: Option<String>,
}

pub struct Overseerr {
    settings: OverseerrSettings,
    client: Client,
    initialized: bool,
    /// `movie-123` / `tv-456` lookups that had no IMDb id
    not_found: Mutex<HashSet<String>>,
}

impl Overseerr {
    pub async fn new(settings: &OverseerrSettings, client: Client) -> Self {
        let mut service = Self {
            settings: settings.clone(),
            client,
            initialized: false,
            not_found: Mutex::new(HashSet::new()),
        };
        service.initialized = service.validate().await;
        if service.initialized {
            info!("Overseerr initialized");
        }
        service
    }

    async fn validate(&self) -> bool {
        if !self.settings.enabled {
            debug!("Overseerr is disabled");
            return false;
        }
        if self.settings.api_key.is_empty() {
            warn!("Overseerr is enabled but has no API key");
            return false;
        }
        match self.get("/api/v1/auth/me").await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Overseerr validation failed");
                false
            }
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ServiceError> {
        let url = format!("{}{}", self.settings.url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.settings.api_key)
            .send()
            .await?;
        check_status(response).await
    }

    /// IMDb id for a request, asking Overseerr when the payload lacks one
    pub async fn resolve_imdb_id(&self, media: &OverseerrMedia) -> Option<String> {
        if let Some(id) = media.imdb_id.as_deref().filter(|id| is_imdb_id(id)) {
            return Some(id.to_string());
        }

        let (kind, id) = media.external_lookup()?;
        let cache_key = format!("{}-{}", kind, id);
        if self
            .not_found
            .lock()
            .map(|set| set.contains(&cache_key))
            .unwrap_or(false)
        {
            return None;
        }

        let details: Option<MediaDetails> =
            match self.get(&format!("/api/v1/{}/{}?language=en", kind, id)).await {
                Ok(response) => response.json().await.ok(),
                Err(e) => {
                    debug!(lookup = %cache_key, error = %e, "Overseerr media lookup failed");
                    return None;
                }
            };

        let imdb_id = details.and_then(|d| d.external_ids.imdb_id).filter(|id| is_imdb_id(id));
        if imdb_id.is_none() {
            debug!(lookup = %cache_key, "No IMDb id for Overseerr media");
            if let Ok(mut set) = self.not_found.lock() {
                set.insert(cache_key);
            }
        }
        imdb_id
    }
}

#[async_trait]
impl ContentService for Overseerr {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Overseerr
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(self.settings.update_interval.max(1))
    }

    async fn fetch(&self) -> Result<Vec<MediaItem>, ServiceError> {
        let page: RequestPage = self
            .get("/api/v1/request?take=10000")
            .await?
            .json()
            .await?;

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for entry in page.results {
            let Some(imdb_id) = self.resolve_imdb_id(&entry.media).await else {
                continue;
            };
            if seen.insert(imdb_id.clone()) {
                let mut item = MediaItem::requested(&imdb_id, self.key());
                item.overseerr_id = entry.media.id;
                items.push(item);
            }
        }
        debug!(count = items.len(), "Fetched Overseerr requests");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{client, serve};
    use axum::{extract::Path, http::HeaderMap, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) == Some("secret")
    }

    async fn mock_overseerr(lookups: Arc<AtomicUsize>) -> String {
        let router = Router::new()
            .route(
                "/api/v1/auth/me",
                get(|headers: HeaderMap| async move {
                    if authorized(&headers) {
                        (StatusCode::OK, Json(json!({"id": 1})))
                    } else {
                        (StatusCode::FORBIDDEN, Json(json!({})))
                    }
                }),
            )
            .route(
                "/api/v1/request",
                get(|| async {
                    Json(json!({
                        "pageInfo": {"results": 4},
                        "results": [
                            {"media": {"id": 10, "imdbId": "tt0133093", "tmdbId": 603, "mediaType": "movie"}},
                            {"media": {"id": 11, "imdbId": null, "tmdbId": 27205, "mediaType": "movie"}},
                            {"media": {"id": 12, "tvdbId": 999, "mediaType": "tv"}},
                            {"media": {"id": 13, "imdbId": "tt0133093", "mediaType": "movie"}}
                        ]
                    }))
                }),
            )
            .route(
                "/api/v1/movie/:id",
                get(move |Path(id): Path<String>| {
                    let lookups = lookups.clone();
                    async move {
                        lookups.fetch_add(1, Ordering::SeqCst);
                        let imdb = if id == "27205" { json!("tt1375666") } else { json!(null) };
                        Json(json!({"externalIds": {"imdbId": imdb}}))
                    }
                }),
            )
            .route(
                "/api/v1/tv/:id",
                get(|| async { Json(json!({"externalIds": {"imdbId": null}})) }),
            );
        serve(router).await
    }

    fn settings(url: String, api_key: &str) -> OverseerrSettings {
        OverseerrSettings {
            enabled: true,
            url,
            api_key: api_key.to_string(),
            update_interval: 60,
        }
    }

    #[tokio::test]
    async fn test_validate_with_bad_key() {
        let url = mock_overseerr(Arc::new(AtomicUsize::new(0))).await;
        let overseerr = Overseerr::new(&settings(url, "wrong"), client()).await;
        assert!(!overseerr.initialized());
    }

    #[tokio::test]
    async fn test_fetch_resolves_missing_imdb_ids() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let url = mock_overseerr(lookups.clone()).await;
        let overseerr = Overseerr::new(&settings(url, "secret"), client()).await;
        assert!(overseerr.initialized());

        let items = overseerr.fetch().await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["tt0133093", "tt1375666"]);
        assert_eq!(items[0].requested_by.as_deref(), Some("overseerr"));
        assert_eq!(items[0].overseerr_id, Some(10));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_remembered() {
        let url = mock_overseerr(Arc::new(AtomicUsize::new(0))).await;
        let overseerr = Overseerr::new(&settings(url, "secret"), client()).await;
        let media = OverseerrMedia {
            tvdb_id: Some(json!(999)),
            media_type: Some("tv".to_string()),
            ..Default::default()
        };

        assert_eq!(overseerr.resolve_imdb_id(&media).await, None);
        assert!(overseerr.not_found.lock().unwrap().contains("tv-999"));
    }

    #[tokio::test]
    async fn test_disabled_makes_no_requests() {
        let mut disabled = settings("http://127.0.0.1:9".to_string(), "secret");
        disabled.enabled = false;
        let overseerr = Overseerr::new(&disabled, client()).await;
        assert!(!overseerr.initialized());
    }
}
