use super::Scraper;
use crate::error::ServiceError;
use crate::http::{check_status, RateLimiter};
use crate::settings::OrionoidSettings;
use async_trait::async_trait;
use mediaferry_common::media::{ItemContext, ItemKind, Stream};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Application key registered with Orionoid
pub const ORIONOID_APP_KEY: &str = "D3CH6HMX9KD9EMD68RXRCDUNBDJV5HRR";

const API_KEY_LEN: usize = 32;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope<T> {
    result: ResultStatus,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResultStatus {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserData {
    status: String,
    subscription: Subscription,
    service: DebridServices,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Subscription {
    package: Package,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Package {
    #[serde(rename = "type")]
    kind: String,
    premium: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DebridServices {
    realdebrid: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamData {
    streams: Vec<OrionStream>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrionStream {
    file: OrionFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrionFile {
    hash: Option<String>,
    name: Option<String>,
}

/// Account tier as reported by Orionoid
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Account {
    premium: bool,
    unlimited: bool,
}

pub struct Orionoid {
    settings: OrionoidSettings,
    client: Client,
    account: Option<Account>,
    rate_limiter: RateLimiter,
}

impl Orionoid {
    pub async fn new(settings: &OrionoidSettings, client: Client) -> Self {
        let mut orionoid = Self {
            settings: settings.clone(),
            client,
            account: None,
            rate_limiter: RateLimiter::per_second(1),
        };
        orionoid.account = orionoid.validate().await;
        if let Some(account) = orionoid.account {
            // Free accounts get 100 calls a day, premium 1000 an hour
            orionoid.rate_limiter = if account.premium {
                RateLimiter::new(1000, Duration::from_secs(3600))
            } else {
                RateLimiter::new(100, Duration::from_secs(86400))
            }
            .paced(1, Duration::from_secs(1));
            info!(premium = account.premium, unlimited = account.unlimited, "Orionoid initialized");
        }
        orionoid
    }

    async fn get<T: DeserializeOwned + Default>(
        &self,
        params: &[(&str, String)],
    ) -> Result<Envelope<T>, ServiceError> {
        let response = self
            .client
            .get(self.settings.url.trim_end_matches('/'))
            .query(&[("keyapp", ORIONOID_APP_KEY), ("keyuser", self.settings.api_key.as_str())])
            .query(params)
            .timeout(Duration::from_secs(60))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn validate(&self) -> Option<Account> {
        if !self.settings.enabled {
            debug!("Orionoid is disabled");
            return None;
        }
        if self.settings.api_key.len() != API_KEY_LEN {
            error!("Orionoid API key is not valid or not set");
            return None;
        }

        let user: Envelope<UserData> = match self
            .get(&[("mode", "user".to_string()), ("action", "retrieve".to_string())])
            .await
        {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "Orionoid failed to initialize");
                return None;
            }
        };
        if user.result.status != "success" {
            error!(status = %user.result.status, "Orionoid API key is invalid");
            return None;
        }

        let data = user.data.unwrap_or_default();
        let premium = data.status == "active" && data.subscription.package.premium && data.service.realdebrid;
        if !premium {
            info!("Orionoid free account detected");
        }
        Some(Account {
            premium,
            unlimited: data.subscription.package.kind == "unlimited",
        })
    }

    fn stream_params(&self, ctx: &ItemContext<'_>, account: Account) -> Option<Vec<(&'static str, String)>> {
        let imdb_id = ctx.imdb_id()?;
        let numeric_id = imdb_id.strip_prefix("tt").unwrap_or(imdb_id);
        let limit = if account.unlimited {
            200
        } else if self.settings.limitcount > 0 {
            self.settings.limitcount
        } else {
            5
        };

        let mut params = vec![
            ("mode", "stream".to_string()),
            ("action", "retrieve".to_string()),
            ("idimdb", numeric_id.to_string()),
            ("streamtype", "torrent".to_string()),
            ("filename", "true".to_string()),
            ("limitcount", limit.to_string()),
            ("video3d", "false".to_string()),
            ("sortorder", "descending".to_string()),
            ("sortvalue", if account.premium { "best" } else { "popularity" }.to_string()),
        ];
        if account.unlimited {
            params.push(("debridlookup", "realdebrid".to_string()));
        }
        match ctx.kind() {
            ItemKind::Movie => params.push(("type", "movie".to_string())),
            ItemKind::Season | ItemKind::Episode => {
                params.push(("type", "show".to_string()));
                params.push(("numberseason", ctx.season_number()?.to_string()));
                params.push(("numberepisode", ctx.episode_number().unwrap_or(1).to_string()));
            }
            _ => return None,
        }
        Some(params)
    }
}

#[async_trait]
impl Scraper for Orionoid {
    fn key(&self) -> &'static str {
        "orionoid"
    }

    fn initialized(&self) -> bool {
        self.account.is_some()
    }

    async fn scrape(&self, ctx: ItemContext<'_>) -> Result<Vec<Stream>, ServiceError> {
        let Some(account) = self.account else {
            return Ok(Vec::new());
        };
        let Some(params) = self.stream_params(&ctx, account) else {
            return Ok(Vec::new());
        };

        if let Err(e) = self.rate_limiter.try_acquire().await {
            debug!(item = %ctx.log_string(), "Orionoid request budget exhausted");
            return Err(e);
        }
        let envelope: Envelope<StreamData> = match self.get(&params).await {
            Ok(envelope) => envelope,
            Err(e) => {
                self.rate_limiter.limit_hit();
                return Err(e);
            }
        };

        let streams: Vec<Stream> = envelope
            .data
            .unwrap_or_default()
            .streams
            .into_iter()
            .filter_map(|s| {
                let hash = s.file.hash.filter(|h| !h.is_empty())?;
                let name = s.file.name.unwrap_or_default();
                Some(Stream::new(&hash, &name))
            })
            .collect();
        debug!(item = %ctx.log_string(), count = streams.len(), "Orionoid streams");
        Ok(streams)
    }
}
