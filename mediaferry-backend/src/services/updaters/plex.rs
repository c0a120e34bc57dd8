//! Plex library refreshes for newly symlinked folders

use crate::error::ServiceError;
use crate::http::check_status;
use crate::services::{RunOutcome, Service, ServiceKind};
use crate::settings::PlexSettings;
use async_trait::async_trait;
use mediaferry_common::media::{ItemKind, ItemPath, MediaItem};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const UPDATED: &str = "updated";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SectionsResponse {
    media_container: SectionContainer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct SectionContainer {
    directory: Vec<Section>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Section {
    key: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(rename = "Location")]
    locations: Vec<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct Location {
    path: String,
}

impl Section {
    fn contains(&self, folder: &str) -> bool {
        self.locations
            .iter()
            .any(|l| !l.path.is_empty() && folder.starts_with(l.path.trim_end_matches('/')))
    }
}

/// Leaf paths under `path` that were symlinked but not yet refreshed
fn pending_leaves(root: &MediaItem, path: ItemPath) -> Vec<ItemPath> {
    let candidates = match root.kind {
        ItemKind::Show => root.episode_paths().into_iter().filter(|p| path.overlaps(p)).collect(),
        _ => vec![ItemPath::ROOT],
    };
    candidates
        .into_iter()
        .filter(|p| {
            root.node(*p)
                .map(|n| n.symlinked && n.update_folder.as_deref() != Some(UPDATED))
                .unwrap_or(false)
        })
        .collect()
}

pub struct PlexUpdater {
    settings: PlexSettings,
    client: Client,
    initialized: bool,
}

impl PlexUpdater {
    pub async fn new(settings: &PlexSettings, client: Client) -> Self {
        let mut updater = Self {
            settings: settings.clone(),
            client,
            initialized: false,
        };
        if settings.token.is_empty() || settings.url.is_empty() {
            debug!("Plex is not configured");
            return updater;
        }
        match updater.sections().await {
            Ok(sections) => {
                updater.initialized = true;
                info!(sections = sections.len(), "Plex updater initialized");
            }
            Err(ServiceError::Api { status: 401, .. }) => warn!("Plex is not authorized"),
            Err(e) => warn!(error = %e, "Plex is not reachable"),
        }
        updater
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, ServiceError> {
        let response = self
            .client
            .get(format!("{}{}", self.settings.url.trim_end_matches('/'), path))
            .header("Accept", "application/json")
            .header("X-Plex-Token", &self.settings.token)
            .query(query)
            .send()
            .await?;
        check_status(response).await
    }

    async fn sections(&self) -> Result<Vec<Section>, ServiceError> {
        let response: SectionsResponse = self.get("/library/sections", &[]).await?.json().await?;
        Ok(response.media_container.directory)
    }

    async fn refresh(&self, section: &Section, folder: &str) -> Result<(), ServiceError> {
        self.get(&format!("/library/sections/{}/refresh", section.key), &[("path", folder)])
            .await?;
        debug!(section = %section.title, folder, "Requested Plex refresh");
        Ok(())
    }
}

#[async_trait]
impl Service for PlexUpdater {
    fn kind(&self) -> ServiceKind {
        ServiceKind::PlexUpdater
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    async fn run(&self, mut root: MediaItem, path: ItemPath) -> Result<Option<RunOutcome>, ServiceError> {
        let leaves = pending_leaves(&root, path);
        if leaves.is_empty() {
            return Ok(None);
        }
        let section_type = if root.kind == ItemKind::Show { "show" } else { "movie" };
        let sections: Vec<Section> = self
            .sections()
            .await?
            .into_iter()
            .filter(|s| s.kind == section_type)
            .collect();
        if sections.is_empty() {
            warn!(item = %root.item_id, section_type, "No Plex section for item type");
            return Ok(None);
        }

        // Episodes of one season share a folder
        let mut refreshed: HashSet<String> = HashSet::new();
        let mut updated = 0;
        for leaf in leaves {
            let Some(node) = root.node_mut(leaf) else {
                continue;
            };
            let Some(folder) = node.update_folder.clone() else {
                continue;
            };
            if !refreshed.contains(&folder) {
                let mut targets: Vec<&Section> = sections.iter().filter(|s| s.contains(&folder)).collect();
                if targets.is_empty() {
                    targets = sections.iter().collect();
                }
                for section in targets {
                    self.refresh(section, &folder).await?;
                }
                refreshed.insert(folder);
            }
            node.update_folder = Some(UPDATED.to_string());
            updated += 1;
        }

        info!(item = %root.item_id, updated, folders = refreshed.len(), "Updated Plex");
        Ok(Some(RunOutcome::new(root, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{client, serve};
    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use mediaferry_common::State as ItemState;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Refreshes = Arc<Mutex<Vec<(String, String)>>>;

    async fn mock_plex() -> (String, Refreshes) {
        let refreshes: Refreshes = Arc::default();
        let router = Router::new()
            .route(
                "/library/sections",
                get(|headers: HeaderMap| async move {
                    if headers.get("X-Plex-Token").and_then(|v| v.to_str().ok()) != Some("token") {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    Ok(Json(json!({"MediaContainer": {"Directory": [
                        {"key": "1", "type": "movie", "title": "Movies", "Location": [{"id": 1, "path": "/library/movies"}]},
                        {"key": "2", "type": "show", "title": "Shows", "Location": [{"id": 2, "path": "/library/shows"}]},
                        {"key": "3", "type": "show", "title": "Anime", "Location": [{"id": 3, "path": "/library/anime_shows"}]}
                    ]}})))
                }),
            )
            .route(
                "/library/sections/:key/refresh",
                get(
                    |State(refreshes): State<Refreshes>,
                     Path(key): Path<String>,
                     Query(query): Query<HashMap<String, String>>| async move {
                        refreshes
                            .lock()
                            .unwrap()
                            .push((key, query.get("path").cloned().unwrap_or_default()));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(refreshes.clone());
        (serve(router).await, refreshes)
    }

    fn settings(url: String) -> PlexSettings {
        PlexSettings {
            user: String::new(),
            token: "token".to_string(),
            url,
        }
    }

    fn symlinked_show() -> MediaItem {
        let mut show = MediaItem::show("tt0944947");
        let mut season = MediaItem::season(1);
        for n in 1..=2 {
            let mut episode = MediaItem::episode(n);
            episode.symlinked = true;
            episode.update_folder = Some("/library/shows/Show (2011) {tt0944947}/Season 01".to_string());
            season.add_child(episode);
        }
        show.add_child(season);
        show
    }

    #[tokio::test]
    async fn test_show_refreshes_matching_section_once() {
        let (url, refreshes) = mock_plex().await;
        let updater = PlexUpdater::new(&settings(url), client()).await;
        assert!(updater.initialized());

        let outcome = updater
            .run(symlinked_show(), ItemPath::season(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.root.state(), ItemState::Completed);

        let refreshes = refreshes.lock().unwrap();
        assert_eq!(refreshes.len(), 1);
        assert_eq!(refreshes[0].0, "2");
        assert!(refreshes[0].1.ends_with("Season 01"));
    }

    #[tokio::test]
    async fn test_nothing_pending_is_noop() {
        let (url, refreshes) = mock_plex().await;
        let updater = PlexUpdater::new(&settings(url), client()).await;

        let mut movie = MediaItem::movie("tt0133093");
        movie.symlinked = true;
        movie.update_folder = Some(UPDATED.to_string());
        assert!(updater.run(movie, ItemPath::ROOT).await.unwrap().is_none());
        assert!(refreshes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_token_not_initialized() {
        let (url, _) = mock_plex().await;
        let mut bad = settings(url);
        bad.token = "nope".to_string();
        assert!(!PlexUpdater::new(&bad, client()).await.initialized());
    }
}
