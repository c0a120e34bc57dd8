use super::Scraper;
use crate::error::ServiceError;
use crate::http::{check_status, RateLimiter};
use crate::parser::title_matches;
use crate::settings::JackettSettings;
use async_trait::async_trait;
use chrono::Datelike;
use mediaferry_common::media::{ItemContext, ItemKind, Stream};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Torznab results converted to JSON
///
/// A channel with a single result carries an object instead of an array.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorznabResponse {
    rss: Rss,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Channel {
    item: OneOrMany<TorznabItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorznabItem {
    title: String,
    #[serde(rename = "torznab:attr")]
    attrs: OneOrMany<TorznabAttr>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorznabAttr {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: String,
}

impl TorznabItem {
    fn infohash(self) -> Option<(String, String)> {
        let hash = self
            .attrs
            .into_vec()
            .into_iter()
            .find(|a| a.name == "infohash" && !a.value.is_empty())?
            .value;
        Some((hash, self.title))
    }
}

pub struct Jackett {
    settings: JackettSettings,
    client: Client,
    initialized: bool,
    rate_limiter: RateLimiter,
}

impl Jackett {
    pub async fn new(settings: &JackettSettings, client: Client) -> Self {
        let mut jackett = Self {
            settings: settings.clone(),
            client,
            initialized: false,
            rate_limiter: RateLimiter::new(1000, Duration::from_secs(3600)).paced(1, Duration::from_secs(1)),
        };
        jackett.initialized = jackett.validate().await;
        if jackett.initialized {
            info!("Jackett initialized");
        }
        jackett
    }

    fn torznab_url(&self, indexers: &str) -> String {
        format!(
            "{}/api/v2.0/indexers/{}/results/torznab",
            self.settings.url.trim_end_matches('/'),
            indexers
        )
    }

    async fn validate(&self) -> bool {
        if !self.settings.enabled {
            debug!("Jackett is disabled");
            return false;
        }
        if self.settings.url.is_empty() || self.settings.api_key.is_empty() {
            info!("Jackett is not configured and will not be used");
            return false;
        }
        let response = self
            .client
            .get(self.torznab_url("!status:failing,test:passed"))
            .query(&[
                ("apikey", self.settings.api_key.as_str()),
                ("cat", "2000"),
                ("t", "movie"),
                ("q", "test"),
            ])
            .timeout(Duration::from_secs(60))
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Jackett validation failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Jackett failed to initialize");
                false
            }
        }
    }

    /// Torznab query parameters for a node
    fn query(ctx: &ItemContext<'_>) -> Option<Vec<(&'static str, String)>> {
        let title = ctx.top_title()?.to_string();
        let mut query = Vec::new();
        match ctx.kind() {
            ItemKind::Movie => {
                query.push(("cat", "2000".to_string()));
                query.push(("t", "movie".to_string()));
                query.push(("q", title));
                if let Some(year) = ctx.target().aired_at.map(|a| a.year()) {
                    query.push(("year", year.to_string()));
                }
            }
            ItemKind::Season | ItemKind::Episode => {
                query.push(("cat", "5000".to_string()));
                query.push(("t", "tvsearch".to_string()));
                query.push(("q", title));
                query.push(("season", ctx.season_number()?.to_string()));
                if let Some(episode) = ctx.episode_number() {
                    query.push(("ep", episode.to_string()));
                }
            }
            _ => return None,
        }
        Some(query)
    }
}

#[async_trait]
impl Scraper for Jackett {
    fn key(&self) -> &'static str {
        "jackett"
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    async fn scrape(&self, ctx: ItemContext<'_>) -> Result<Vec<Stream>, ServiceError> {
        let Some(mut query) = Self::query(&ctx) else {
            return Ok(Vec::new());
        };
        let Some(correct_title) = ctx.top_title() else {
            return Ok(Vec::new());
        };
        query.push(("apikey", self.settings.api_key.clone()));

        self.rate_limiter.try_acquire().await?;
        let response = self
            .client
            .get(self.torznab_url("all"))
            .header("Accept", "application/json")
            .query(&query)
            .timeout(Duration::from_secs(60))
            .send()
            .await?;
        let data: TorznabResponse = match check_status(response).await {
            Ok(response) => response.json().await?,
            Err(ServiceError::RateLimited) => {
                self.rate_limiter.limit_hit();
                return Err(ServiceError::RateLimited);
            }
            Err(e) => return Err(e),
        };

        let items = data.rss.channel.item.into_vec();
        let total = items.len();
        let streams: Vec<Stream> = items
            .into_iter()
            .filter_map(TorznabItem::infohash)
            .filter(|(_, title)| title_matches(correct_title, title))
            .map(|(hash, title)| Stream::new(&hash, &title))
            .collect();
        debug!(item = %ctx.log_string(), total, kept = streams.len(), "Jackett results");
        Ok(streams)
    }
}
