use crate::error::ServiceError;
use crate::http::{check_status, RateLimiter};
use crate::services::{ContentService, ServiceKind};
use crate::settings::MdblistSettings;
use async_trait::async_trait;
use mediaferry_common::MediaItem;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const API_KEY_LEN: usize = 25;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserInfo {
    limits: Limits,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Limits {
    api_requests: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self { api_requests: 1000 }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListEntry {
    imdb_id: Option<String>,
}

/// Mdblist answers with a flat array or split movies/shows
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListItems {
    Flat(Vec<ListEntry>),
    Split {
        #[serde(default)]
        movies: Vec<ListEntry>,
        #[serde(default)]
        shows: Vec<ListEntry>,
    },
}

impl ListItems {
    fn into_ids(self) -> Vec<String> {
        let entries = match self {
            ListItems::Flat(entries) => entries,
            ListItems::Split { movies, shows } => movies.into_iter().chain(shows).collect(),
        };
        entries
            .into_iter()
            .filter_map(|e| e.imdb_id.filter(|id| !id.is_empty()))
            .collect()
    }
}

pub struct Mdblist {
    settings: MdblistSettings,
    client: Client,
    initialized: bool,
    rate_limiter: RateLimiter,
}

impl Mdblist {
    pub async fn new(settings: &MdblistSettings, client: Client) -> Self {
        let mut service = Self {
            settings: settings.clone(),
            client,
            initialized: false,
            rate_limiter: RateLimiter::new(1, Duration::from_secs(120)),
        };
        if let Some(user) = service.validate().await {
            // Daily quota spread over two-minute windows
            let per_window = (user.limits.api_requests / 720).max(1);
            service.rate_limiter = RateLimiter::new(per_window, Duration::from_secs(120));
            service.initialized = true;
            info!(requests_per_2_min = per_window, "Mdblist initialized");
        }
        service
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.settings.url.trim_end_matches('/'), path)
    }

    async fn validate(&self) -> Option<UserInfo> {
        if !self.settings.enabled {
            debug!("Mdblist is disabled");
            return None;
        }
        if self.settings.lists.iter().all(|l| l.is_empty()) {
            error!("Mdblist is enabled but has no lists");
            return None;
        }
        if self.settings.api_key.len() != API_KEY_LEN {
            error!("Mdblist API key is not set or invalid");
            return None;
        }

        let response = self
            .client
            .get(self.api_url("/user"))
            .query(&[("apikey", self.settings.api_key.as_str())])
            .send()
            .await;
        let body = match response {
            Ok(response) => response.text().await.unwrap_or_default(),
            Err(e) => {
                error!(error = %e, "Mdblist is not reachable");
                return None;
            }
        };
        if body.contains("Invalid API key!") {
            error!("Mdblist API key is invalid");
            return None;
        }
        Some(serde_json::from_str(&body).unwrap_or_default())
    }

    async fn list_ids(&self, list: &str) -> Result<Vec<String>, ServiceError> {
        let response = self
            .client
            .get(self.api_url(&format!("/lists/{}/items", list)))
            .query(&[("apikey", self.settings.api_key.as_str())])
            .send()
            .await?;
        let items: ListItems = check_status(response).await?.json().await?;
        Ok(items.into_ids())
    }
}

#[async_trait]
impl ContentService for Mdblist {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Mdblist
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(self.settings.update_interval.max(1))
    }

    async fn fetch(&self) -> Result<Vec<MediaItem>, ServiceError> {
        let mut items = Vec::new();
        for list in self.settings.lists.iter().filter(|l| !l.is_empty()) {
            if self.rate_limiter.try_acquire().await.is_err() {
                warn!("Mdblist request budget exhausted, resuming next run");
                break;
            }
            for id in self.list_ids(list).await? {
                if !items.iter().any(|i: &MediaItem| i.item_id == id) {
                    items.push(MediaItem::requested(&id, self.key()));
                }
            }
        }
        Ok(items)
    }
}
