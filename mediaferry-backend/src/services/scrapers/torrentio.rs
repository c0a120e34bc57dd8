use super::Scraper;
use crate::error::ServiceError;
use crate::http::{check_status, RateLimiter};
use crate::settings::TorrentioSettings;
use async_trait::async_trait;
use mediaferry_common::media::{ItemContext, ItemKind, Stream};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamsResponse {
    streams: Vec<TorrentioStream>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentioStream {
    title: String,
    #[serde(rename = "infoHash")]
    info_hash: Option<String>,
}

/// Release name from a Torrentio stream title
///
/// Titles carry seeders and size after a `\n👤` marker.
fn release_name(title: &str) -> &str {
    title.split("\n👤").next().unwrap_or(title).trim()
}

pub struct Torrentio {
    settings: TorrentioSettings,
    client: Client,
    rate_limiter: RateLimiter,
}

impl Torrentio {
    pub fn new(settings: &TorrentioSettings, client: Client) -> Self {
        if settings.enabled {
            info!("Torrentio initialized");
        }
        Self {
            settings: settings.clone(),
            client,
            rate_limiter: RateLimiter::new(60, Duration::from_secs(60)).paced(1, Duration::from_secs(1)),
        }
    }

    /// `movie/tt123` or `series/tt123:1:2`
    fn identifier(ctx: &ItemContext<'_>) -> Option<String> {
        let imdb_id = ctx.imdb_id()?;
        match ctx.kind() {
            ItemKind::Movie => Some(format!("movie/{}", imdb_id)),
            ItemKind::Season => Some(format!("series/{}:{}:1", imdb_id, ctx.season_number()?)),
            ItemKind::Episode => Some(format!(
                "series/{}:{}:{}",
                imdb_id,
                ctx.season_number()?,
                ctx.episode_number()?
            )),
            _ => None,
        }
    }
}

#[async_trait]
impl Scraper for Torrentio {
    fn key(&self) -> &'static str {
        "torrentio"
    }

    fn initialized(&self) -> bool {
        self.settings.enabled
    }

    async fn scrape(&self, ctx: ItemContext<'_>) -> Result<Vec<Stream>, ServiceError> {
        let Some(identifier) = Self::identifier(&ctx) else {
            return Ok(Vec::new());
        };
        let filter = self.settings.filter.trim_matches('/');
        let url = if filter.is_empty() {
            format!("{}/stream/{}.json", self.settings.url.trim_end_matches('/'), identifier)
        } else {
            format!("{}/{}/stream/{}.json", self.settings.url.trim_end_matches('/'), filter, identifier)
        };

        self.rate_limiter.try_acquire().await?;
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.rate_limiter.limit_hit();
                return Err(e.into());
            }
        };
        let data: StreamsResponse = match check_status(response).await {
            Ok(response) => response.json().await?,
            Err(e) => {
                self.rate_limiter.limit_hit();
                return Err(e);
            }
        };

        let streams: Vec<Stream> = data
            .streams
            .iter()
            .filter_map(|s| {
                let hash = s.info_hash.as_deref().filter(|h| !h.is_empty())?;
                Some(Stream::new(hash, release_name(&s.title)))
            })
            .collect();
        debug!(item = %ctx.log_string(), count = streams.len(), "Torrentio streams");
        Ok(streams)
    }
}
