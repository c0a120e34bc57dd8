use crate::error::ServiceError;
use crate::http::check_status;
use crate::services::{ContentService, ServiceKind};
use crate::settings::{IndexerSettings, TraktContentSettings};
use async_trait::async_trait;
use mediaferry_common::MediaItem;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListEntry {
    movie: Option<Entity>,
    show: Option<Entity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Entity {
    ids: Ids,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Ids {
    imdb: Option<String>,
}

impl ListEntry {
    fn imdb_id(self) -> Option<String> {
        self.movie
            .or(self.show)
            .and_then(|e| e.ids.imdb)
            .filter(|id| !id.is_empty())
    }
}

/// Trakt watchlist and public user lists
pub struct TraktContent {
    settings: TraktContentSettings,
    api_url: String,
    client: Client,
    initialized: bool,
}

impl TraktContent {
    pub fn new(settings: &TraktContentSettings, indexer: &IndexerSettings, client: Client) -> Self {
        let initialized = Self::validate(settings);
        if initialized {
            info!("Trakt content initialized");
        }
        Self {
            settings: settings.clone(),
            api_url: indexer.url.trim_end_matches('/').to_string(),
            client,
            initialized,
        }
    }

    fn validate(settings: &TraktContentSettings) -> bool {
        if !settings.enabled {
            debug!("Trakt content is disabled");
            return false;
        }
        if settings.api_key.is_empty() {
            warn!("Trakt content is enabled but has no API key");
            return false;
        }
        let has_watchlist = settings.watchlist && !settings.username.is_empty();
        if !has_watchlist && settings.user_lists.iter().all(|l| l.is_empty()) {
            warn!("Trakt content has neither a watchlist user nor user lists");
            return false;
        }
        true
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, ServiceError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .header("Content-Type", "application/json")
            .header("trakt-api-version", "2")
            .header("trakt-api-key", &self.settings.api_key)
            .send()
            .await?;
        let entries: Vec<ListEntry> = check_status(response).await?.json().await?;
        Ok(entries.into_iter().filter_map(ListEntry::imdb_id).collect())
    }
}

#[async_trait]
impl ContentService for TraktContent {
    fn kind(&self) -> ServiceKind {
        ServiceKind::TraktContent
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(self.settings.update_interval.max(1))
    }

    async fn fetch(&self) -> Result<Vec<MediaItem>, ServiceError> {
        let mut ids = BTreeSet::new();
        if self.settings.watchlist && !self.settings.username.is_empty() {
            ids.extend(
                self.list(&format!("/users/{}/watchlist", self.settings.username))
                    .await?,
            );
        }
        for user_list in &self.settings.user_lists {
            let Some((user, slug)) = user_list.split_once('/') else {
                warn!(list = %user_list, "Trakt user list must be user/slug");
                continue;
            };
            match self.list(&format!("/users/{}/lists/{}/items", user, slug)).await {
                Ok(list_ids) => ids.extend(list_ids),
                Err(e) => warn!(list = %user_list, error = %e, "Failed to fetch Trakt list"),
            }
        }
        Ok(ids
            .iter()
            .map(|id| MediaItem::requested(id, self.key()))
            .collect())
    }
}
