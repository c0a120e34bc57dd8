//! Real-Debrid downloader
//!
//! Checks which scraped streams are instantly available, adds the best
//! cached one to the account and maps its files onto the movie or episodes.

use crate::error::ServiceError;
use crate::http::{check_status, RateLimiter};
use crate::parser::parse_release;
use crate::services::{RunOutcome, Service, ServiceKind};
use crate::settings::RealDebridSettings;
use async_trait::async_trait;
use mediaferry_common::media::{ActiveStream, DebridFile, ItemKind, ItemPath, MediaItem};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Video containers worth downloading
pub const WANTED_EXTENSIONS: [&str; 3] = [".mkv", ".mp4", ".avi"];

const AVAILABILITY_CHUNK: usize = 5;

fn is_wanted(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    WANTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[derive(Debug, Deserialize)]
struct RdFile {
    filename: String,
    filesize: u64,
}

#[derive(Debug, Deserialize)]
struct AddedTorrent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TorrentSummary {
    id: String,
    hash: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentInfo {
    filename: Option<String>,
    original_filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RdUser {
    premium: i64,
}

/// Wanted-file containers per hash from an instantAvailability response
///
/// Uncached hashes come back as an empty array instead of an object.
fn parse_availability(data: HashMap<String, Value>) -> HashMap<String, Vec<Vec<DebridFile>>> {
    data.into_iter()
        .map(|(hash, value)| {
            let containers: Vec<BTreeMap<String, RdFile>> = value
                .get("rd")
                .cloned()
                .and_then(|rd| serde_json::from_value(rd).ok())
                .unwrap_or_default();
            let mut containers: Vec<Vec<DebridFile>> = containers
                .into_iter()
                .map(|container| {
                    container
                        .into_iter()
                        .filter(|(_, file)| is_wanted(&file.filename))
                        .filter_map(|(id, file)| {
                            Some(DebridFile {
                                id: id.parse().ok()?,
                                filename: file.filename,
                                filesize: file.filesize,
                            })
                        })
                        .collect()
                })
                .filter(|files: &Vec<DebridFile>| !files.is_empty())
                .collect();
            containers.sort_by_key(|files| std::cmp::Reverse(files.len()));
            (hash.to_lowercase(), containers)
        })
        .collect()
}

/// Episodes of `season` a file covers
///
/// Shows with a single season accept files that carry no season marker.
fn file_episodes(filename: &str, season: u32, one_season: bool) -> Vec<u32> {
    let parsed = parse_release(filename);
    if parsed.seasons.contains(&season) || (one_season && parsed.seasons.is_empty()) {
        parsed.episodes
    } else {
        Vec::new()
    }
}

/// The node being downloaded, reduced to what file matching needs
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Movie,
    Season { number: u32, episodes: Vec<u32> },
    Episode { season: u32, number: u32 },
}

/// Filename per node: `None` is the target itself, `Some(n)` its episode `n`
type Assignment = Vec<(Option<u32>, String)>;

impl Target {
    fn of(node: &MediaItem, path: ItemPath) -> Option<Self> {
        match node.kind {
            ItemKind::Movie => Some(Target::Movie),
            ItemKind::Season => Some(Target::Season {
                number: node.number?,
                episodes: node.children.iter().filter_map(|e| e.number).collect(),
            }),
            ItemKind::Episode => Some(Target::Episode {
                season: path.season?,
                number: node.number?,
            }),
            _ => None,
        }
    }

    /// Whether a container satisfies the target, and how its files map
    fn assign(&self, files: &[DebridFile], one_season: bool) -> Option<Assignment> {
        match self {
            Target::Movie => match files {
                [file] => Some(vec![(None, file.filename.clone())]),
                _ => None,
            },
            Target::Season { number, episodes } => {
                if episodes.is_empty() {
                    return None;
                }
                let mut matched: BTreeMap<u32, String> = BTreeMap::new();
                for file in files {
                    for episode in file_episodes(&file.filename, *number, one_season) {
                        if episodes.contains(&episode) {
                            matched.entry(episode).or_insert_with(|| file.filename.clone());
                        }
                    }
                }
                if matched.len() < episodes.len() {
                    return None;
                }
                Some(matched.into_iter().map(|(e, f)| (Some(e), f)).collect())
            }
            Target::Episode { season, number } => files
                .iter()
                .find(|f| file_episodes(&f.filename, *season, one_season).contains(number))
                .map(|f| vec![(None, f.filename.clone())]),
        }
    }
}

/// A cached stream chosen for download
#[derive(Debug)]
struct CachedPick {
    hash: String,
    files: Vec<DebridFile>,
    assignment: Assignment,
}

pub struct RealDebrid {
    settings: RealDebridSettings,
    client: Client,
    initialized: bool,
    rate_limiter: RateLimiter,
}

impl RealDebrid {
    pub async fn new(settings: &RealDebridSettings, client: Client) -> Self {
        let mut service = Self {
            settings: settings.clone(),
            client,
            initialized: false,
            rate_limiter: RateLimiter::new(250, Duration::from_secs(60)),
        };
        service.initialized = service.validate().await;
        if service.initialized {
            info!("Real-Debrid initialized");
        }
        service
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        self.rate_limiter.acquire().await;
        let response = request.bearer_auth(&self.settings.api_key).send().await?;
        match check_status(response).await {
            Err(ServiceError::RateLimited) => {
                self.rate_limiter.limit_hit();
                Err(ServiceError::RateLimited)
            }
            other => other,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self.send(self.client.get(self.url(path))).await?;
        Ok(response.json().await?)
    }

    async fn validate(&self) -> bool {
        if self.settings.api_key.is_empty() {
            warn!("Real-Debrid API key is not set");
            return false;
        }
        match self.get::<RdUser>("/user").await {
            Ok(user) if user.premium > 0 => true,
            Ok(_) => {
                warn!("Real-Debrid account is not premium");
                false
            }
            Err(e) => {
                warn!(error = %e, "Real-Debrid validation failed");
                false
            }
        }
    }

    /// Account details, as returned by `GET /user`
    pub async fn user(&self) -> Result<Value, ServiceError> {
        if self.settings.api_key.is_empty() {
            return Err(ServiceError::NotConfigured("Real-Debrid API key is not set".to_string()));
        }
        self.get("/user").await
    }

    /// First stream (in rank order) with a container matching the target
    ///
    /// `Ok(None)` only when every availability check succeeded. A failed
    /// chunk without a match elsewhere is returned as the error, so the
    /// streams are kept for a later attempt.
    async fn find_cached(
        &self,
        target: &Target,
        hashes: &[String],
        one_season: bool,
    ) -> Result<Option<CachedPick>, ServiceError> {
        let mut failure = None;
        for chunk in hashes.chunks(AVAILABILITY_CHUNK) {
            let data: HashMap<String, Value> = match self
                .get(&format!("/torrents/instantAvailability/{}", chunk.join("/")))
                .await
            {
                Ok(data) => data,
                Err(ServiceError::RateLimited) => return Err(ServiceError::RateLimited),
                Err(e) => {
                    warn!(error = %e, "Real-Debrid availability check failed");
                    failure.get_or_insert(e);
                    continue;
                }
            };
            let mut availability = parse_availability(data);

            for hash in chunk {
                let Some(containers) = availability.remove(hash) else {
                    continue;
                };
                for files in containers {
                    if let Some(assignment) = target.assign(&files, one_season) {
                        return Ok(Some(CachedPick {
                            hash: hash.clone(),
                            files,
                            assignment,
                        }));
                    }
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Id of the torrent for `hash`, adding it to the account if needed
    async fn torrent_id(&self, hash: &str, files: &[DebridFile]) -> Result<String, ServiceError> {
        let torrents: Vec<TorrentSummary> = self.get("/torrents?limit=1000").await?;
        if let Some(existing) = torrents.into_iter().find(|t| t.hash.eq_ignore_ascii_case(hash)) {
            debug!(hash, id = %existing.id, "Torrent already in Real-Debrid account");
            return Ok(existing.id);
        }

        let magnet = format!("magnet:?xt=urn:btih:{}&dn=&tr=", hash);
        let added: AddedTorrent = self
            .send(
                self.client
                    .post(self.url("/torrents/addMagnet"))
                    .form(&[("magnet", magnet)]),
            )
            .await?
            .json()
            .await?;

        let ids: Vec<String> = files.iter().map(|f| f.id.to_string()).collect();
        self.send(
            self.client
                .post(self.url(&format!("/torrents/selectFiles/{}", added.id)))
                .form(&[("files", ids.join(","))]),
        )
        .await?;
        debug!(hash, id = %added.id, files = ids.len(), "Added magnet to Real-Debrid");
        Ok(added.id)
    }
}

#[async_trait]
impl Service for RealDebrid {
    fn kind(&self) -> ServiceKind {
        ServiceKind::RealDebrid
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    async fn run(&self, mut root: MediaItem, path: ItemPath) -> Result<Option<RunOutcome>, ServiceError> {
        let one_season = root.children.len() == 1;
        let log_string = root.context(path).map(|c| c.log_string()).unwrap_or_default();
        let node = root
            .node(path)
            .ok_or_else(|| ServiceError::InvalidItem(format!("{} has no node {}", root.item_id, path)))?;
        let Some(target) = Target::of(node, path) else {
            return Ok(None);
        };
        if node.file.is_some() && node.folder.is_some() {
            return Ok(None);
        }
        let hashes: Vec<String> = node.streams.iter().map(|s| s.infohash.clone()).collect();
        if hashes.is_empty() {
            return Ok(None);
        }

        debug!(item = %log_string, streams = hashes.len(), "Checking Real-Debrid availability");
        let pick = self.find_cached(&target, &hashes, one_season).await?;

        let Some(pick) = pick else {
            info!(item = %log_string, checked = hashes.len(), "No cached streams, clearing for rescrape");
            if let Some(node) = root.node_mut(path) {
                node.streams.clear();
            }
            return Ok(Some(RunOutcome::new(root, path)));
        };

        let id = self.torrent_id(&pick.hash, &pick.files).await?;
        let info: TorrentInfo = self.get(&format!("/torrents/info/{}", id)).await?;

        let Some(node) = root.node_mut(path) else {
            return Ok(None);
        };
        for stream in node.streams.iter_mut() {
            if stream.infohash == pick.hash {
                stream.cached = Some(true);
            }
        }
        node.active_stream = Some(ActiveStream {
            hash: pick.hash.clone(),
            id: Some(id),
            name: info.filename.clone(),
            files: pick.files,
        });

        for (episode, filename) in pick.assignment {
            let slot = match episode {
                None => Some(&mut *node),
                Some(number) => node.child_mut(number),
            };
            if let Some(slot) = slot {
                slot.folder = info.filename.clone();
                slot.alternative_folder = info.original_filename.clone();
                slot.file = Some(filename);
            }
        }

        info!(item = %log_string, hash = %pick.hash, "Downloaded from Real-Debrid");
        Ok(Some(RunOutcome::new(root, path)))
    }
}
