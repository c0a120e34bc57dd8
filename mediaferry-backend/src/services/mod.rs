//! Pipeline services
//!
//! Content services poll watchlists for wanted IMDb ids. Every other service
//! takes a root item plus the path of the node to work on and returns the
//! updated root.

pub mod content;
pub mod downloaders;
pub mod indexers;
pub mod libraries;
pub mod scrapers;
pub mod symlink;
pub mod updaters;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::ServiceError;
use crate::http::build_client;
use crate::settings::AppSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaferry_common::media::{ItemPath, MediaItem};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use content::{Listrr, Mdblist, Overseerr, PlexWatchlist, TraktContent};
use downloaders::RealDebrid;
use indexers::TraktIndexer;
use libraries::SymlinkLibrary;
use scrapers::Scraping;
use symlink::Symlinker;
use updaters::PlexUpdater;

/// Every producer of pipeline events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Overseerr,
    PlexWatchlist,
    Listrr,
    Mdblist,
    TraktContent,
    TraktIndexer,
    Scraping,
    RealDebrid,
    Symlinker,
    PlexUpdater,
    SymlinkLibrary,
    /// Added through the HTTP API
    Manual,
    RetryLibrary,
    StateTransition,
}

impl ServiceKind {
    pub const CONTENT: [ServiceKind; 5] = [
        ServiceKind::Overseerr,
        ServiceKind::PlexWatchlist,
        ServiceKind::Listrr,
        ServiceKind::Mdblist,
        ServiceKind::TraktContent,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ServiceKind::Overseerr => "overseerr",
            ServiceKind::PlexWatchlist => "plex_watchlist",
            ServiceKind::Listrr => "listrr",
            ServiceKind::Mdblist => "mdblist",
            ServiceKind::TraktContent => "trakt_content",
            ServiceKind::TraktIndexer => "trakt_indexer",
            ServiceKind::Scraping => "scraping",
            ServiceKind::RealDebrid => "real_debrid",
            ServiceKind::Symlinker => "symlinker",
            ServiceKind::PlexUpdater => "plex_updater",
            ServiceKind::SymlinkLibrary => "symlink_library",
            ServiceKind::Manual => "manual",
            ServiceKind::RetryLibrary => "retry_library",
            ServiceKind::StateTransition => "state_transition",
        }
    }

    /// Services whose items have to be indexed before anything else
    pub fn is_source(&self) -> bool {
        Self::CONTENT.contains(self) || *self == ServiceKind::SymlinkLibrary
    }

    /// Parallel jobs allowed for this service
    ///
    /// Read from `{KEY}_MAX_WORKERS`, default 1.
    pub fn max_workers(&self) -> usize {
        let var = format!("{}_MAX_WORKERS", self.key().to_ascii_uppercase());
        std::env::var(&var)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a service run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub root: MediaItem,
    /// Node to continue with; the indexer may widen a season to its show
    pub path: ItemPath,
    /// Do not process before this time
    pub run_at: Option<DateTime<Utc>>,
}

impl RunOutcome {
    pub fn new(root: MediaItem, path: ItemPath) -> Self {
        Self {
            root,
            path,
            run_at: None,
        }
    }
}

/// A pipeline stage working on one node of a root item
#[async_trait]
pub trait Service: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn key(&self) -> &'static str {
        self.kind().key()
    }

    fn initialized(&self) -> bool;

    /// `Ok(None)` means nothing changed and the event is finished
    async fn run(&self, root: MediaItem, path: ItemPath)
        -> Result<Option<RunOutcome>, ServiceError>;
}

/// A watchlist source
#[async_trait]
pub trait ContentService: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn key(&self) -> &'static str {
        self.kind().key()
    }

    fn initialized(&self) -> bool;

    fn update_interval(&self) -> Duration;

    /// Requested items; ids already known may be included
    async fn fetch(&self) -> Result<Vec<MediaItem>, ServiceError>;
}

/// Every service built from one settings snapshot
pub struct ServiceRegistry {
    pub content: Vec<Arc<dyn ContentService>>,
    pub overseerr: Arc<Overseerr>,
    pub indexer: Arc<TraktIndexer>,
    pub scraping: Arc<Scraping>,
    pub downloader: Arc<RealDebrid>,
    pub symlinker: Arc<Symlinker>,
    pub updater: Arc<PlexUpdater>,
    pub library: Arc<SymlinkLibrary>,
}

impl ServiceRegistry {
    /// Build and validate every service
    ///
    /// A service that fails validation is kept but reports
    /// `initialized() == false`.
    pub async fn build(settings: &AppSettings) -> Result<Self, ServiceError> {
        let client = build_client(Duration::from_secs(30))?;

        let overseerr = Arc::new(Overseerr::new(&settings.content.overseerr, client.clone()).await);
        let content: Vec<Arc<dyn ContentService>> = vec![
            overseerr.clone(),
            Arc::new(
                PlexWatchlist::new(&settings.content.plex_watchlist, &settings.plex, client.clone())
                    .await,
            ),
            Arc::new(Listrr::new(&settings.content.listrr, client.clone()).await),
            Arc::new(Mdblist::new(&settings.content.mdblist, client.clone()).await),
            Arc::new(TraktContent::new(&settings.content.trakt, &settings.indexer, client.clone())),
        ];

        let indexer = Arc::new(TraktIndexer::new(&settings.indexer, client.clone()));
        let scraping = Arc::new(Scraping::new(settings, client.clone()).await);
        let downloader = Arc::new(RealDebrid::new(&settings.real_debrid, client.clone()).await);
        let symlinker = Arc::new(Symlinker::new(&settings.symlink));
        let updater = Arc::new(PlexUpdater::new(&settings.plex, client).await);
        let library = Arc::new(SymlinkLibrary::new(&settings.symlink));

        let registry = Self {
            content,
            overseerr,
            indexer,
            scraping,
            downloader,
            symlinker,
            updater,
            library,
        };

        for (key, initialized) in registry.status() {
            if initialized {
                info!(service = key, "Service initialized");
            }
        }
        Ok(registry)
    }

    /// The worker behind a non-content service kind
    pub fn service(&self, kind: ServiceKind) -> Option<Arc<dyn Service>> {
        let service: Arc<dyn Service> = match kind {
            ServiceKind::TraktIndexer => self.indexer.clone(),
            ServiceKind::Scraping => self.scraping.clone(),
            ServiceKind::RealDebrid => self.downloader.clone(),
            ServiceKind::Symlinker => self.symlinker.clone(),
            ServiceKind::PlexUpdater => self.updater.clone(),
            _ => return None,
        };
        Some(service)
    }

    /// Whether the pipeline can run end to end
    pub fn validate(&self) -> bool {
        let mut valid = true;
        for (name, ok) in [
            ("indexer", self.indexer.initialized()),
            ("scraper", self.scraping.initialized()),
            ("downloader", self.downloader.initialized()),
            ("symlinker", self.symlinker.initialized()),
            ("updater", self.updater.initialized()),
        ] {
            if !ok {
                warn!(service = name, "Required service is not initialized");
                valid = false;
            }
        }
        valid
    }

    /// Initialization state of every service keyed by name
    pub fn status(&self) -> BTreeMap<&'static str, bool> {
        let mut status = BTreeMap::new();
        for service in &self.content {
            status.insert(service.key(), service.initialized());
        }
        for (key, ok) in self.scraping.scraper_status() {
            status.insert(key, ok);
        }
        status.insert(self.indexer.key(), self.indexer.initialized());
        status.insert(self.scraping.key(), self.scraping.initialized());
        status.insert(self.downloader.key(), self.downloader.initialized());
        status.insert(self.symlinker.key(), self.symlinker.initialized());
        status.insert(self.updater.key(), self.updater.initialized());
        status.insert(ServiceKind::SymlinkLibrary.key(), self.library.initialized());
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_source_kinds() {
        assert!(ServiceKind::Overseerr.is_source());
        assert!(ServiceKind::SymlinkLibrary.is_source());
        assert!(!ServiceKind::TraktIndexer.is_source());
        assert!(!ServiceKind::Manual.is_source());
    }

    #[test]
    #[serial]
    fn test_max_workers_from_env() {
        std::env::remove_var("SCRAPING_MAX_WORKERS");
        assert_eq!(ServiceKind::Scraping.max_workers(), 1);

        std::env::set_var("SCRAPING_MAX_WORKERS", "4");
        assert_eq!(ServiceKind::Scraping.max_workers(), 4);

        std::env::set_var("SCRAPING_MAX_WORKERS", "zero");
        assert_eq!(ServiceKind::Scraping.max_workers(), 1);
        std::env::remove_var("SCRAPING_MAX_WORKERS");
    }

    #[tokio::test]
    async fn test_default_settings_are_not_valid() {
        let registry = ServiceRegistry::build(&AppSettings::default()).await.unwrap();
        assert!(!registry.validate());
        let status = registry.status();
        assert_eq!(status.get("real_debrid"), Some(&false));
        assert_eq!(status.get("torrentio"), Some(&false));
        assert!(registry.service(ServiceKind::Scraping).is_some());
        assert!(registry.service(ServiceKind::Overseerr).is_none());
    }
}
