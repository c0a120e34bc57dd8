//! Trakt metadata indexer
//!
//! Turns a bare IMDb id into a movie or a show with its full season and
//! episode tree.

use crate::error::ServiceError;
use crate::http::{check_status, RateLimiter};
use crate::services::{RunOutcome, Service, ServiceKind};
use crate::settings::IndexerSettings;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mediaferry_common::media::{ItemPath, MediaItem};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public client id used when no key is configured
pub const TRAKT_CLIENT_ID: &str =
    "0183a05ad97098d87287fe46da4ae286f434f32e8e951caad4cc147c947d79a3";

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "type")]
    kind: String,
    movie: Option<TraktMedia>,
    show: Option<TraktMedia>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TraktMedia {
    title: Option<String>,
    year: Option<i32>,
    number: Option<u32>,
    ids: TraktIds,
    released: Option<String>,
    first_aired: Option<String>,
    genres: Vec<String>,
    network: Option<String>,
    country: Option<String>,
    language: Option<String>,
    episodes: Vec<TraktMedia>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TraktIds {
    imdb: Option<String>,
    tvdb: Option<serde_json::Value>,
    tmdb: Option<serde_json::Value>,
}

fn id_to_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Air date from `released` (movies) or `first_aired` (everything else)
fn aired_at(data: &TraktMedia, is_movie: bool) -> Option<DateTime<Utc>> {
    if is_movie {
        let released = data.released.as_deref()?;
        let date = NaiveDate::parse_from_str(released, "%Y-%m-%d").ok()?;
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    let first_aired = data.first_aired.as_deref()?;
    DateTime::parse_from_rfc3339(first_aired)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn apply_metadata(item: &mut MediaItem, data: TraktMedia, is_movie: bool) {
    item.aired_at = aired_at(&data, is_movie);
    item.title = data.title;
    item.year = data.year;
    item.tvdb_id = id_to_string(data.ids.tvdb);
    item.tmdb_id = id_to_string(data.ids.tmdb);
    if data.ids.imdb.is_some() {
        item.imdb_id = data.ids.imdb;
    }
    item.is_anime = data.genres.iter().any(|g| g.eq_ignore_ascii_case("anime"));
    item.genres = data.genres;
    item.network = data.network;
    item.country = data.country;
    item.language = data.language;
}

pub struct TraktIndexer {
    api_url: String,
    client_id: String,
    update_interval: chrono::Duration,
    client: Client,
    rate_limiter: RateLimiter,
}

impl TraktIndexer {
    pub fn new(settings: &IndexerSettings, client: Client) -> Self {
        let client_id = if settings.api_key.is_empty() {
            TRAKT_CLIENT_ID.to_string()
        } else {
            settings.api_key.clone()
        };
        Self {
            api_url: settings.url.trim_end_matches('/').to_string(),
            client_id,
            update_interval: chrono::Duration::seconds(settings.update_interval as i64),
            client,
            rate_limiter: RateLimiter::new(1000, Duration::from_secs(300)),
        }
    }

    /// Whether an item needs (re-)indexing
    pub fn should_submit(&self, item: &MediaItem, now: DateTime<Utc>) -> bool {
        match item.indexed_at {
            None => true,
            Some(indexed_at) => now - indexed_at > self.update_interval,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        self.rate_limiter.acquire().await;
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .header("Content-Type", "application/json")
            .header("trakt-api-version", "2")
            .header("trakt-api-key", &self.client_id)
            .send()
            .await?;
        let response = match check_status(response).await {
            Err(ServiceError::RateLimited) => {
                self.rate_limiter.limit_hit();
                return Err(ServiceError::RateLimited);
            }
            other => other?,
        };
        Ok(response.json().await?)
    }

    /// Look an IMDb id up and build a fully populated root item
    pub async fn index(&self, imdb_id: &str) -> Result<Option<MediaItem>, ServiceError> {
        let results: Vec<SearchResult> = self
            .get(&format!("/search/imdb/{}?extended=full", imdb_id))
            .await?;
        let Some(first) = results.into_iter().next() else {
            return Ok(None);
        };

        let mut item = match (first.kind.as_str(), first.movie, first.show) {
            ("movie", Some(data), _) => {
                let mut movie = MediaItem::movie(imdb_id);
                apply_metadata(&mut movie, data, true);
                movie
            }
            ("show", _, Some(data)) => {
                let mut show = MediaItem::show(imdb_id);
                apply_metadata(&mut show, data, false);
                self.add_seasons(&mut show, imdb_id).await?;
                show
            }
            (kind, _, _) => {
                debug!(imdb_id, kind, "Unsupported Trakt result type");
                return Ok(None);
            }
        };
        item.item_id = imdb_id.to_string();
        item.imdb_id = Some(imdb_id.to_string());
        item.refresh_child_ids();
        item.propagate_attributes_to_children();
        Ok(Some(item))
    }

    async fn add_seasons(&self, show: &mut MediaItem, imdb_id: &str) -> Result<(), ServiceError> {
        let seasons: Vec<TraktMedia> = self
            .get(&format!("/shows/{}/seasons?extended=episodes,full", imdb_id))
            .await?;
        for mut season_data in seasons {
            let Some(number) = season_data.number.filter(|n| *n > 0) else {
                continue;
            };
            let episodes = std::mem::take(&mut season_data.episodes);
            let mut season = MediaItem::season(number);
            apply_metadata(&mut season, season_data, false);
            season.imdb_id = None;
            for episode_data in episodes {
                let Some(episode_number) = episode_data.number else {
                    continue;
                };
                let mut episode = MediaItem::episode(episode_number);
                apply_metadata(&mut episode, episode_data, false);
                episode.imdb_id = None;
                season.add_child(episode);
            }
            show.add_child(season);
        }
        Ok(())
    }
}

#[async_trait]
impl Service for TraktIndexer {
    fn kind(&self) -> ServiceKind {
        ServiceKind::TraktIndexer
    }

    fn initialized(&self) -> bool {
        !self.client_id.is_empty()
    }

    async fn run(&self, root: MediaItem, _path: ItemPath) -> Result<Option<RunOutcome>, ServiceError> {
        let Some(imdb_id) = root.imdb_id.clone() else {
            return Err(ServiceError::InvalidItem(format!(
                "{} has no IMDb id and cannot be indexed",
                root.item_id
            )));
        };

        let Some(mut indexed) = self.index(&imdb_id).await? else {
            warn!(imdb_id = %imdb_id, "Trakt has no match");
            return Err(ServiceError::NotFound(imdb_id));
        };

        indexed.requested_at = root.requested_at.or(indexed.requested_at);
        indexed.requested_by = root.requested_by.clone();
        indexed.overseerr_id = root.overseerr_id;
        indexed.indexed_at = Some(Utc::now());

        info!(
            imdb_id = %imdb_id,
            kind = %indexed.kind,
            seasons = indexed.children.len(),
            "Indexed {}",
            indexed.title.as_deref().unwrap_or(&imdb_id)
        );
        Ok(Some(RunOutcome::new(indexed, ItemPath::ROOT)))
    }
}
