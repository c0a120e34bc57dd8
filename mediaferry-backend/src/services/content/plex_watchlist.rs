use crate::error::ServiceError;
use crate::http::check_status;
use crate::services::{ContentService, ServiceKind};
use crate::settings::{PlexSettings, PlexWatchlistSettings};
use async_trait::async_trait;
use mediaferry_common::MediaItem;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ContainerResponse {
    media_container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct MediaContainer {
    metadata: Vec<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metadata {
    #[serde(rename = "ratingKey")]
    rating_key: Option<String>,
    #[serde(rename = "Guid")]
    guid: Vec<GuidEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GuidEntry {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RssFeed {
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RssItem {
    guids: Vec<String>,
}

fn imdb_from_guid(guid: &str) -> Option<String> {
    guid.strip_prefix("imdb://")
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Plex watchlist plus the optional Plex RSS feed
pub struct PlexWatchlist {
    settings: PlexWatchlistSettings,
    token: String,
    client: Client,
    initialized: bool,
    rss_enabled: bool,
    /// Ids already yielded by an earlier fetch
    recurring: Mutex<HashSet<String>>,
}

impl PlexWatchlist {
    pub async fn new(settings: &PlexWatchlistSettings, plex: &PlexSettings, client: Client) -> Self {
        let mut service = Self {
            settings: settings.clone(),
            token: plex.token.clone(),
            client,
            initialized: false,
            rss_enabled: false,
            recurring: Mutex::new(HashSet::new()),
        };

        if !settings.enabled {
            debug!("Plex watchlist is disabled");
            return service;
        }
        if !settings.rss.is_empty() {
            match service.client.get(&settings.rss).send().await {
                Ok(response) if response.status().is_success() => service.rss_enabled = true,
                Ok(response) => warn!(
                    status = response.status().as_u16(),
                    "Plex RSS feed is not reachable, falling back to the watchlist"
                ),
                Err(e) => warn!(error = %e, "Plex RSS feed is not reachable, falling back to the watchlist"),
            }
        }
        service.initialized = service.rss_enabled || !service.token.is_empty();
        if service.initialized {
            info!(rss = service.rss_enabled, "Plex watchlist initialized");
        } else {
            warn!("Plex watchlist is enabled but neither an RSS feed nor a Plex token is set");
        }
        service
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn watchlist_ids(&self) -> Result<Vec<String>, ServiceError> {
        if self.token.is_empty() {
            return Ok(Vec::new());
        }
        let base = self.settings.url.trim_end_matches('/');
        let listing: ContainerResponse = self
            .get_json(
                &format!("{}/library/sections/watchlist/all", base),
                &[
                    ("X-Plex-Token", self.token.as_str()),
                    ("includeFields", "title,year,ratingkey"),
                    ("includeElements", "Guid"),
                    ("sort", "watchlistedAt:desc"),
                ],
            )
            .await?;

        let mut ids = Vec::new();
        for entry in listing.media_container.metadata {
            let Some(rating_key) = entry.rating_key.filter(|k| !k.is_empty()) else {
                continue;
            };
            match self.rating_key_to_imdb(base, &rating_key).await {
                Ok(Some(id)) => ids.push(id),
                Ok(None) => debug!(rating_key = %rating_key, "No IMDb id for watchlist entry"),
                Err(e) => debug!(rating_key = %rating_key, error = %e, "Watchlist metadata lookup failed"),
            }
        }
        Ok(ids)
    }

    async fn rating_key_to_imdb(&self, base: &str, rating_key: &str) -> Result<Option<String>, ServiceError> {
        let details: ContainerResponse = self
            .get_json(
                &format!("{}/library/metadata/{}", base, rating_key),
                &[
                    ("X-Plex-Token", self.token.as_str()),
                    ("includeGuids", "1"),
                    ("includeFields", "guid,title,year"),
                    ("includeElements", "Guid"),
                ],
            )
            .await?;
        Ok(details
            .media_container
            .metadata
            .first()
            .and_then(|m| m.guid.iter().find_map(|g| imdb_from_guid(&g.id))))
    }

    async fn rss_ids(&self) -> Vec<String> {
        if !self.rss_enabled {
            return Vec::new();
        }
        match self.get_json::<RssFeed>(&self.settings.rss, &[]).await {
            Ok(feed) => feed
                .items
                .iter()
                .flat_map(|item| item.guids.iter().filter_map(|g| imdb_from_guid(g)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to fetch Plex RSS feed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ContentService for PlexWatchlist {
    fn kind(&self) -> ServiceKind {
        ServiceKind::PlexWatchlist
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(self.settings.update_interval.max(1))
    }

    async fn fetch(&self) -> Result<Vec<MediaItem>, ServiceError> {
        let mut ids = self.watchlist_ids().await?;
        ids.extend(self.rss_ids().await);

        let mut recurring = self
            .recurring
            .lock()
            .map_err(|_| ServiceError::Parse("watchlist cache poisoned".to_string()))?;
        Ok(ids
            .into_iter()
            .filter(|id| recurring.insert(id.clone()))
            .map(|id| MediaItem::requested(&id, self.key()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{client, serve};
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::json;

    async fn mock_plex() -> String {
        let router = Router::new()
            .route(
                "/library/sections/watchlist/all",
                get(|| async {
                    Json(json!({"MediaContainer": {"Metadata": [
                        {"ratingKey": "abc", "title": "The Matrix"},
                        {"ratingKey": "def", "title": "Unknown"}
                    ]}}))
                }),
            )
            .route(
                "/library/metadata/:key",
                get(|Path(key): Path<String>| async move {
                    let guids = if key == "abc" {
                        json!([{"id": "tmdb://603"}, {"id": "imdb://tt0133093"}])
                    } else {
                        json!([])
                    };
                    Json(json!({"MediaContainer": {"Metadata": [{"Guid": guids}]}}))
                }),
            )
            .route(
                "/rss",
                get(|| async {
                    Json(json!({"items": [
                        {"guids": ["imdb://tt0944947", "tvdb://121361"]},
                        {"guids": ["imdb://tt0133093"]}
                    ]}))
                }),
            );
        serve(router).await
    }

    #[tokio::test]
    async fn test_watchlist_and_rss_union() {
        let base = mock_plex().await;
        let settings = PlexWatchlistSettings {
            enabled: true,
            rss: format!("{}/rss", base),
            url: base,
            update_interval: 60,
        };
        let plex = PlexSettings {
            token: "token".to_string(),
            ..Default::default()
        };
        let watchlist = PlexWatchlist::new(&settings, &plex, client()).await;
        assert!(watchlist.initialized());

        let items = watchlist.fetch().await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["tt0133093", "tt0944947"]);

        // Recurring ids are not yielded again
        assert!(watchlist.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_needs_token_or_rss() {
        let settings = PlexWatchlistSettings {
            enabled: true,
            ..Default::default()
        };
        let watchlist = PlexWatchlist::new(&settings, &PlexSettings::default(), client()).await;
        assert!(!watchlist.initialized());
    }

    #[test]
    fn test_imdb_from_guid() {
        assert_eq!(imdb_from_guid("imdb://tt0133093").as_deref(), Some("tt0133093"));
        assert_eq!(imdb_from_guid("tmdb://603"), None);
    }
}
