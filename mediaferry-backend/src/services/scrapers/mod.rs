//! Torrent scrapers and the aggregate scraping service

mod jackett;
mod orionoid;
mod torrentio;

pub use jackett::Jackett;
pub use orionoid::{Orionoid, ORIONOID_APP_KEY};
pub use torrentio::Torrentio;

use crate::error::ServiceError;
use crate::parser::ReleaseParser;
use crate::services::{RunOutcome, Service, ServiceKind};
use crate::settings::{AppSettings, ScrapingSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaferry_common::media::{ItemContext, ItemKind, ItemPath, MediaItem, Stream};
use reqwest::Client;
use tracing::{debug, error, info, warn};

/// A single torrent source
#[async_trait]
pub trait Scraper: Send + Sync {
    fn key(&self) -> &'static str;

    fn initialized(&self) -> bool;

    /// Candidate streams for the node the context points at
    ///
    /// Kinds the source cannot query yield an empty list.
    async fn scrape(&self, ctx: ItemContext<'_>) -> Result<Vec<Stream>, ServiceError>;
}

/// Minimum time between scrapes of the same item
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeBackoff {
    after_2: f64,
    after_5: f64,
    after_10: f64,
}

impl ScrapeBackoff {
    pub fn new(settings: &ScrapingSettings) -> Self {
        Self {
            after_2: settings.after_2,
            after_5: settings.after_5,
            after_10: settings.after_10,
        }
    }

    /// Seconds to wait after `scraped_times` attempts
    pub fn window_secs(&self, scraped_times: u32) -> f64 {
        match scraped_times {
            0..=1 => 5.0,
            2..=5 => self.after_2 * 3600.0,
            6..=10 => self.after_5 * 3600.0,
            _ => self.after_10 * 3600.0,
        }
    }

    pub fn should_submit(&self, item: &MediaItem, now: DateTime<Utc>) -> bool {
        match item.scraped_at {
            None => true,
            Some(scraped_at) => {
                let elapsed = (now - scraped_at).num_milliseconds() as f64 / 1000.0;
                elapsed > self.window_secs(item.scraped_times)
            }
        }
    }
}

/// Whether a node may be sent to the scrapers now
///
/// Shows are never scraped as a whole; their seasons are.
pub fn can_scrape(item: &MediaItem, backoff: &ScrapeBackoff, now: DateTime<Utc>) -> bool {
    item.kind != ItemKind::Show && item.is_released(now) && backoff.should_submit(item, now)
}

pub struct Scraping {
    scrapers: Vec<Box<dyn Scraper>>,
    backoff: ScrapeBackoff,
    parser: ReleaseParser,
}

impl Scraping {
    pub async fn new(settings: &AppSettings, client: Client) -> Self {
        let scraping = &settings.scraping;
        let scrapers: Vec<Box<dyn Scraper>> = vec![
            Box::new(Orionoid::new(&scraping.orionoid, client.clone()).await),
            Box::new(Torrentio::new(&scraping.torrentio, client.clone())),
            Box::new(Jackett::new(&scraping.jackett, client).await),
        ];
        Self::with_scrapers(scrapers, settings)
    }

    pub fn with_scrapers(scrapers: Vec<Box<dyn Scraper>>, settings: &AppSettings) -> Self {
        let service = Self {
            scrapers,
            backoff: ScrapeBackoff::new(&settings.scraping),
            parser: ReleaseParser::new(&settings.parser),
        };
        if !service.initialized() {
            error!("No scraping services are enabled, enable at least one");
        }
        service
    }

    pub fn backoff(&self) -> &ScrapeBackoff {
        &self.backoff
    }

    pub fn can_scrape(&self, item: &MediaItem, now: DateTime<Utc>) -> bool {
        can_scrape(item, &self.backoff, now)
    }

    pub fn scraper_status(&self) -> Vec<(&'static str, bool)> {
        self.scrapers
            .iter()
            .map(|s| (s.key(), s.initialized()))
            .collect()
    }
}

#[async_trait]
impl Service for Scraping {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Scraping
    }

    fn initialized(&self) -> bool {
        self.scrapers.iter().any(|s| s.initialized())
    }

    async fn run(&self, mut root: MediaItem, path: ItemPath) -> Result<Option<RunOutcome>, ServiceError> {
        let now = Utc::now();
        let mut found = Vec::new();
        {
            let ctx = root
                .context(path)
                .ok_or_else(|| ServiceError::InvalidItem(format!("{} has no node {}", root.item_id, path)))?;
            if !self.can_scrape(ctx.target(), now) {
                debug!(item = %ctx.log_string(), "Not scrapeable yet");
                return Ok(None);
            }

            let mut answered = false;
            for scraper in self.scrapers.iter().filter(|s| s.initialized()) {
                match scraper.scrape(ctx).await {
                    Ok(streams) => {
                        debug!(scraper = scraper.key(), item = %ctx.log_string(), count = streams.len(), "Scraped");
                        answered = true;
                        found.extend(streams);
                    }
                    Err(e) => warn!(scraper = scraper.key(), item = %ctx.log_string(), error = %e, "Scrape failed"),
                }
            }
            // An attempt only counts against the backoff when some scraper answered
            if !answered {
                warn!(item = %ctx.log_string(), "Every scraper failed, leaving scrape count unchanged");
                return Ok(None);
            }
        }

        let log_string = root.context(path).map(|c| c.log_string()).unwrap_or_default();
        let Some(node) = root.node_mut(path) else {
            return Ok(None);
        };
        node.add_streams(found);
        node.streams = self.parser.rank_streams(std::mem::take(&mut node.streams));
        node.scraped_at = Some(now);
        node.scraped_times += 1;

        if node.streams.is_empty() {
            info!(item = %log_string, attempts = node.scraped_times, "No acceptable streams found");
        } else {
            info!(item = %log_string, count = node.streams.len(), "Found streams");
        }
        Ok(Some(RunOutcome::new(root, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct FixedScraper(Vec<Stream>);

    #[async_trait]
    impl Scraper for FixedScraper {
        fn key(&self) -> &'static str {
            "fixed"
        }

        fn initialized(&self) -> bool {
            true
        }

        async fn scrape(&self, _ctx: ItemContext<'_>) -> Result<Vec<Stream>, ServiceError> {
            Ok(self.0.clone())
        }
    }

    struct FailingScraper;

    #[async_trait]
    impl Scraper for FailingScraper {
        fn key(&self) -> &'static str {
            "failing"
        }

        fn initialized(&self) -> bool {
            true
        }

        async fn scrape(&self, _ctx: ItemContext<'_>) -> Result<Vec<Stream>, ServiceError> {
            Err(ServiceError::RateLimited)
        }
    }

    fn released_movie() -> MediaItem {
        let mut movie = MediaItem::movie("tt0133093");
        movie.title = Some("The Matrix".to_string());
        movie.aired_at = Some(Utc::now() - Duration::days(365));
        movie
    }

    fn backoff() -> ScrapeBackoff {
        ScrapeBackoff::new(&ScrapingSettings::default())
    }

    // ========================================
    // Backoff
    // ========================================

    #[test]
    fn test_backoff_windows() {
        let backoff = backoff();
        assert_eq!(backoff.window_secs(0), 5.0);
        assert_eq!(backoff.window_secs(1), 5.0);
        assert_eq!(backoff.window_secs(2), 1800.0);
        assert_eq!(backoff.window_secs(5), 1800.0);
        assert_eq!(backoff.window_secs(6), 7200.0);
        assert_eq!(backoff.window_secs(10), 7200.0);
        assert_eq!(backoff.window_secs(11), 86400.0);
    }

    #[test]
    fn test_should_submit_respects_window() {
        let backoff = backoff();
        let now = Utc::now();
        let mut movie = released_movie();
        assert!(backoff.should_submit(&movie, now));

        movie.scraped_times = 3;
        movie.scraped_at = Some(now - Duration::minutes(10));
        assert!(!backoff.should_submit(&movie, now));

        movie.scraped_at = Some(now - Duration::minutes(31));
        assert!(backoff.should_submit(&movie, now));
    }

    #[test]
    fn test_can_scrape_requires_release_and_not_show() {
        let backoff = backoff();
        let now = Utc::now();
        assert!(can_scrape(&released_movie(), &backoff, now));

        let mut unreleased = released_movie();
        unreleased.aired_at = Some(now + Duration::days(10));
        assert!(!can_scrape(&unreleased, &backoff, now));

        let mut undated = released_movie();
        undated.aired_at = None;
        assert!(!can_scrape(&undated, &backoff, now));

        let mut show = MediaItem::show("tt0944947");
        show.aired_at = Some(now - Duration::days(1000));
        assert!(!can_scrape(&show, &backoff, now));
    }

    // ========================================
    // Aggregate run
    // ========================================

    #[tokio::test]
    async fn test_run_merges_and_ranks() {
        let scraping = Scraping::with_scrapers(
            vec![
                Box::new(FixedScraper(vec![
                    Stream::new("AAA", "The.Matrix.1999.1080p.BluRay.x264"),
                    Stream::new("bbb", "The.Matrix.1999.CAM"),
                ])),
                Box::new(FailingScraper),
                Box::new(FixedScraper(vec![
                    Stream::new("aaa", "The.Matrix.1999.1080p.BluRay.x264"),
                    Stream::new("ccc", "The.Matrix.1999.1080p.PROPER.WEB-DL"),
                ])),
            ],
            &AppSettings::default(),
        );
        assert!(scraping.initialized());

        let outcome = scraping
            .run(released_movie(), ItemPath::ROOT)
            .await
            .unwrap()
            .unwrap();
        let movie = outcome.root;
        let hashes: Vec<_> = movie.streams.iter().map(|s| s.infohash.as_str()).collect();
        assert_eq!(hashes, vec!["ccc", "aaa"]);
        assert_eq!(movie.scraped_times, 1);
        assert!(movie.scraped_at.is_some());
    }

    #[tokio::test]
    async fn test_run_with_only_failures_keeps_attempt_count() {
        let scraping = Scraping::with_scrapers(
            vec![Box::new(FailingScraper), Box::new(FailingScraper)],
            &AppSettings::default(),
        );
        let movie = released_movie();

        assert!(scraping.run(movie.clone(), ItemPath::ROOT).await.unwrap().is_none());
        assert!(scraping.run(movie, ItemPath::ROOT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_skips_when_backed_off() {
        let scraping = Scraping::with_scrapers(vec![Box::new(FixedScraper(Vec::new()))], &AppSettings::default());
        let mut movie = released_movie();
        movie.scraped_times = 1;
        movie.scraped_at = Some(Utc::now());

        assert!(scraping.run(movie, ItemPath::ROOT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_on_episode_updates_only_that_node() {
        let scraping = Scraping::with_scrapers(
            vec![Box::new(FixedScraper(vec![Stream::new(
                "eee",
                "Show.S01E02.1080p.WEB-DL",
            )]))],
            &AppSettings::default(),
        );
        let mut show = MediaItem::show("tt0944947");
        let mut season = MediaItem::season(1);
        for n in 1..=2 {
            let mut episode = MediaItem::episode(n);
            episode.aired_at = Some(Utc::now() - Duration::days(10));
            season.add_child(episode);
        }
        show.add_child(season);

        let outcome = scraping
            .run(show, ItemPath::episode(1, 2))
            .await
            .unwrap()
            .unwrap();
        let root = outcome.root;
        assert_eq!(root.node(ItemPath::episode(1, 2)).unwrap().streams.len(), 1);
        assert!(root.node(ItemPath::episode(1, 1)).unwrap().streams.is_empty());
        assert_eq!(outcome.path, ItemPath::episode(1, 2));
    }
}
