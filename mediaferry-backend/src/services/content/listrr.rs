use crate::error::ServiceError;
use crate::http::check_status;
use crate::services::{ContentService, ServiceKind};
use crate::settings::ListrrSettings;
use async_trait::async_trait;
use mediaferry_common::MediaItem;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const API_KEY_LEN: usize = 64;
const LIST_ID_LEN: usize = 24;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ListPage {
    pages: u32,
    items: Vec<ListEntry>,
}

impl Default for ListPage {
    fn default() -> Self {
        Self {
            pages: 1,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListEntry {
    #[serde(rename = "imDbId")]
    imdb_id: Option<String>,
    id: Option<serde_json::Value>,
}

pub struct Listrr {
    settings: ListrrSettings,
    client: Client,
    initialized: bool,
}

impl Listrr {
    pub async fn new(settings: &ListrrSettings, client: Client) -> Self {
        let mut service = Self {
            settings: settings.clone(),
            client,
            initialized: false,
        };
        service.initialized = service.validate().await;
        if service.initialized {
            info!("Listrr initialized");
        }
        service
    }

    fn validate_config(settings: &ListrrSettings) -> bool {
        if !settings.enabled {
            debug!("Listrr is disabled");
            return false;
        }
        if settings.api_key.len() != API_KEY_LEN {
            error!("Listrr API key is not set or invalid");
            return false;
        }
        let lists: Vec<&String> = settings
            .movie_lists
            .iter()
            .chain(settings.show_lists.iter())
            .filter(|l| !l.is_empty())
            .collect();
        if lists.is_empty() {
            error!("Both Listrr movie and show lists are empty");
            return false;
        }
        if let Some(bad) = lists.iter().find(|l| l.len() != LIST_ID_LEN) {
            error!(list = %bad, "Invalid Listrr list id");
            return false;
        }
        true
    }

    async fn validate(&self) -> bool {
        if !Self::validate_config(&self.settings) {
            return false;
        }
        let url = format!("{}/", self.settings.url.trim_end_matches('/'));
        match self
            .client
            .get(url)
            .header("X-Api-Key", &self.settings.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                error!(status = response.status().as_u16(), "Listrr ping failed");
                false
            }
            Err(e) => {
                error!(error = %e, "Listrr ping failed");
                false
            }
        }
    }

    /// Every IMDb id in the given lists, paging until the last page
    async fn list_ids(&self, content_type: &str, lists: &[String]) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for list_id in lists.iter().filter(|l| l.len() == LIST_ID_LEN) {
            let mut page = 1;
            let mut total_pages = 1;
            while page <= total_pages {
                match self.fetch_page(content_type, list_id, page).await {
                    Ok(data) => {
                        total_pages = data.pages;
                        for entry in data.items {
                            match entry.imdb_id.filter(|id| !id.is_empty()) {
                                Some(id) => {
                                    ids.insert(id);
                                }
                                None => debug!(entry = ?entry.id, "Listrr entry has no IMDb id"),
                            }
                        }
                    }
                    Err(e) => {
                        warn!(list = %list_id, page, error = %e, "Listrr page request failed");
                        break;
                    }
                }
                page += 1;
            }
        }
        ids
    }

    async fn fetch_page(&self, content_type: &str, list_id: &str, page: u32) -> Result<ListPage, ServiceError> {
        let url = format!(
            "{}/api/List/{}/{}/ReleaseDate/Descending/{}",
            self.settings.url.trim_end_matches('/'),
            content_type,
            list_id,
            page
        );
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.settings.api_key)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[async_trait]
impl ContentService for Listrr {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Listrr
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn update_interval(&self) -> Duration {
        Duration::from_secs(self.settings.update_interval.max(1))
    }

    async fn fetch(&self) -> Result<Vec<MediaItem>, ServiceError> {
        let mut ids = self.list_ids("Movies", &self.settings.movie_lists).await;
        ids.extend(self.list_ids("Shows", &self.settings.show_lists).await);
        Ok(ids
            .iter()
            .map(|id| MediaItem::requested(id, self.key()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{client, serve};
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::json;

    const LIST: &str = "0123456789abcdef01234567";

    fn settings(url: String) -> ListrrSettings {
        ListrrSettings {
            enabled: true,
            url,
            api_key: "k".repeat(API_KEY_LEN),
            movie_lists: vec![LIST.to_string()],
            show_lists: Vec::new(),
            update_interval: 300,
        }
    }

    #[test]
    fn test_config_validation() {
        let good = settings("http://localhost".to_string());
        assert!(Listrr::validate_config(&good));

        let mut short_key = good.clone();
        short_key.api_key = "short".to_string();
        assert!(!Listrr::validate_config(&short_key));

        let mut bad_list = good.clone();
        bad_list.show_lists = vec!["too-short".to_string()];
        assert!(!Listrr::validate_config(&bad_list));

        let mut no_lists = good;
        no_lists.movie_lists.clear();
        assert!(!Listrr::validate_config(&no_lists));
    }

    #[tokio::test]
    async fn test_fetch_pages_through_list() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/api/List/Movies/:list/ReleaseDate/Descending/:page",
                get(|Path((_list, page)): Path<(String, u32)>| async move {
                    let items = match page {
                        1 => json!([{"imDbId": "tt0133093"}, {"imDbId": null, "id": 5}]),
                        _ => json!([{"imDbId": "tt1375666"}]),
                    };
                    Json(json!({"pages": 2, "items": items}))
                }),
            );
        let url = serve(router).await;

        let listrr = Listrr::new(&settings(url), client()).await;
        assert!(listrr.initialized());
        let items = listrr.fetch().await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["tt0133093", "tt1375666"]);
        assert_eq!(items[0].requested_by.as_deref(), Some("listrr"));
    }
}
