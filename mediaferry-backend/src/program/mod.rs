//! The pipeline driver
//!
//! Owns the service registry, the event manager and the background tasks:
//! - settings watcher rebuilding services on every change
//! - scheduler polling content services and retrying the library
//! - main loop routing finished events to the next service

mod event_manager;
mod state_transition;

pub use event_manager::{Event, EventManager, QueueSnapshot};
pub use state_transition::{process_event, ProcessedEvent, Submission};

use crate::db::MediaStore;
use crate::error::ServiceError;
use crate::services::{ContentService, Service, ServiceKind, ServiceRegistry};
use crate::settings::{AppSettings, SettingsManager};
use chrono::Utc;
use mediaferry_common::events::{EventBus, FerryEvent};
use mediaferry_common::media::{ItemPath, MediaItem};
use mediaferry_common::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often every incomplete item is queued again
pub const RETRY_LIBRARY_INTERVAL: Duration = Duration::from_secs(600);

/// Delay before retrying a node whose root has an overlapping job running
const OVERLAP_RETRY_SECS: i64 = 10;

pub struct Program {
    settings: Arc<SettingsManager>,
    store: MediaStore,
    bus: EventBus,
    events: Arc<EventManager>,
    services: RwLock<Arc<ServiceRegistry>>,
    valid: AtomicBool,
    cancel: CancellationToken,
}

impl Program {
    pub async fn new(
        settings: Arc<SettingsManager>,
        store: MediaStore,
        bus: EventBus,
    ) -> std::result::Result<Arc<Self>, ServiceError> {
        let registry = ServiceRegistry::build(&settings.current()).await?;
        let valid = registry.validate();
        Ok(Arc::new(Self {
            settings,
            store,
            events: Arc::new(EventManager::new(bus.clone())),
            bus,
            services: RwLock::new(Arc::new(registry)),
            valid: AtomicBool::new(valid),
            cancel: CancellationToken::new(),
        }))
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &Arc<SettingsManager> {
        &self.settings
    }

    pub async fn services(&self) -> Arc<ServiceRegistry> {
        self.services.read().await.clone()
    }

    /// Whether every required service is initialized
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        info!("Stopping program");
        self.cancel.cancel();
    }

    pub async fn queue_snapshot(&self) -> QueueSnapshot {
        self.events.snapshot().await
    }

    /// Rebuild every service from the current settings
    pub async fn rebuild_services(&self) -> std::result::Result<(), ServiceError> {
        let registry = ServiceRegistry::build(&self.settings.current()).await?;
        let valid = registry.validate();
        *self.services.write().await = Arc::new(registry);
        self.valid.store(valid, Ordering::Relaxed);
        info!(valid, "Services rebuilt");
        Ok(())
    }

    /// Spawn the settings watcher, scheduler and main loop
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("Starting program");
        let settings_rx = self.settings.subscribe();
        vec![
            tokio::spawn(Arc::clone(self).watch_settings(settings_rx)),
            tokio::spawn(Arc::clone(self).scheduler()),
            tokio::spawn(Arc::clone(self).run()),
        ]
    }

    async fn watch_settings(self: Arc<Self>, mut rx: watch::Receiver<AppSettings>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            info!("Settings changed, reinitializing services");
            if let Err(e) = self.rebuild_services().await {
                error!(error = %e, "Failed to rebuild services");
            }
        }
    }

    async fn scheduler(self: Arc<Self>) {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        let mut last_fetch: HashMap<ServiceKind, Instant> = HashMap::new();
        let mut last_retry: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            if !self.is_valid() {
                continue;
            }

            let services = self.services().await;
            for service in services.content.iter().filter(|s| s.initialized()) {
                let kind = service.kind();
                let due = last_fetch
                    .get(&kind)
                    .map(|t| t.elapsed() >= service.update_interval())
                    .unwrap_or(true);
                if due {
                    last_fetch.insert(kind, Instant::now());
                    tokio::spawn(Arc::clone(&self).fetch_content(Arc::clone(service)));
                }
            }

            if last_retry.map(|t| t.elapsed() >= RETRY_LIBRARY_INTERVAL).unwrap_or(true) {
                last_retry = Some(Instant::now());
                match self.retry_library().await {
                    Ok(count) if count > 0 => info!(count, "Retrying incomplete items"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Failed to retry library"),
                }
            }
        }
    }

    async fn fetch_content(self: Arc<Self>, service: Arc<dyn ContentService>) {
        let items = match service.fetch().await {
            Ok(items) => items,
            Err(e) => {
                warn!(service = service.key(), error = %e, "Content fetch failed");
                return;
            }
        };

        self.queue_content(service.key(), service.kind(), items).await;
    }

    /// Queue fetched requests that are new, and stored ones due for re-indexing
    async fn queue_content(&self, key: &str, kind: ServiceKind, items: Vec<MediaItem>) -> usize {
        let indexer = self.services().await.indexer.clone();
        let now = Utc::now();
        let (mut added, mut refreshed) = (0, 0);
        for item in items {
            let Some(imdb_id) = item.imdb_id.clone() else {
                continue;
            };
            match self.store.get_by_imdb(&imdb_id).await {
                Ok(Some(stored)) => {
                    if indexer.should_submit(&stored, now)
                        && self.events.add_event(Event::new(kind, stored)).await
                    {
                        refreshed += 1;
                    }
                }
                Ok(None) => {
                    if self.add_to_queue(item, kind).await {
                        added += 1;
                    }
                }
                Err(e) => error!(imdb_id = %imdb_id, error = %e, "Store lookup failed"),
            }
        }
        if added > 0 {
            info!(service = key, added, "Added new items");
        }
        if refreshed > 0 {
            debug!(service = key, refreshed, "Queued stored items for re-indexing");
        }
        added + refreshed
    }

    async fn run(self: Arc<Self>) {
        let mut waiting_logged = false;
        let mut cold_started = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if !self.is_valid() {
                if !waiting_logged {
                    warn!("Required services are not initialized, waiting for configuration");
                    waiting_logged = true;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
                continue;
            }
            waiting_logged = false;

            if !cold_started {
                cold_started = true;
                if let Err(e) = self.cold_start().await {
                    error!(error = %e, "Failed to load symlink library");
                }
            }

            match self.events.next().await {
                Some(event) => {
                    let item_id = event.item_id().to_string();
                    if let Err(e) = self.handle_event(event).await {
                        error!(item = %item_id, error = %e, "Failed to process event");
                    }
                }
                None => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.events.wait(Duration::from_secs(1)) => {}
                },
            }
        }
        info!("Program loop stopped");
    }

    /// Rebuild items from the symlink library when the store is empty
    async fn cold_start(&self) -> Result<usize> {
        if self.store.count().await? > 0 {
            return Ok(0);
        }
        let services = self.services().await;
        if !services.library.initialized() {
            return Ok(0);
        }
        let items = match services.library.run().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Symlink library scan failed");
                return Ok(0);
            }
        };

        let count = items.len();
        for item in items {
            self.store.upsert(&item).await?;
            self.events
                .add_event(Event::new(ServiceKind::SymlinkLibrary, item))
                .await;
        }
        info!(count, "Loaded items from the symlink library");
        Ok(count)
    }

    /// Route one event and hand its nodes to the next services
    pub async fn handle_event(&self, event: Event) -> Result<ProcessedEvent> {
        let services = self.services().await;
        let existing = self.store.get(event.item_id()).await?;
        let emitted_by = event.emitted_by;
        debug!(item = %event.item_id(), emitted_by = %emitted_by, "Processing event");

        let processed = process_event(
            existing.as_ref(),
            emitted_by,
            event.item,
            event.path,
            &services,
            Utc::now(),
        );

        if let Some(updated) = &processed.updated {
            self.persist(updated).await?;
        }

        for submission in &processed.submissions {
            let root = processed.root.clone();
            if self.events.is_running(&root.item_id, submission.path).await {
                debug!(item = %root.item_id, path = %submission.path, "Node busy, retrying later");
                let retry = Event::new(ServiceKind::StateTransition, root)
                    .at(submission.path)
                    .delayed(chrono::Duration::seconds(OVERLAP_RETRY_SECS));
                self.events.push(retry).await;
                continue;
            }
            match services.service(submission.service) {
                Some(service) => {
                    let job = Event::new(ServiceKind::StateTransition, root).at(submission.path);
                    self.events.submit_job(service, job).await;
                }
                None => warn!(service = %submission.service, "No worker for service"),
            }
        }
        Ok(processed)
    }

    /// Store a root and announce a state change
    async fn persist(&self, item: &MediaItem) -> Result<()> {
        let previous = self.store.upsert(item).await?;
        let state = item.state();
        if previous != Some(state) {
            info!(
                item = %item.item_id,
                old_state = ?previous,
                new_state = %state.as_str(),
                "Item state changed"
            );
            self.bus.emit_lossy(FerryEvent::ItemStateChanged {
                item_id: item.item_id.clone(),
                title: item.title.clone(),
                old_state: previous,
                new_state: state,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Queue an item unless it is already queued or running
    pub async fn add_to_queue(&self, item: MediaItem, emitted_by: ServiceKind) -> bool {
        let imdb_id = item.imdb_id.clone();
        let requested_by = item
            .requested_by
            .clone()
            .unwrap_or_else(|| emitted_by.key().to_string());
        let queued = self.events.add_event(Event::new(emitted_by, item)).await;
        if queued && (emitted_by.is_source() || emitted_by == ServiceKind::Manual) {
            if let Some(imdb_id) = imdb_id {
                self.bus.emit_lossy(FerryEvent::ItemRequested {
                    imdb_id,
                    requested_by,
                    timestamp: Utc::now(),
                });
            }
        }
        queued
    }

    /// Queue every stored item that is not Completed
    pub async fn retry_library(&self) -> Result<usize> {
        let mut queued = 0;
        for item in self.store.incomplete().await? {
            if self
                .events
                .add_event(Event::new(ServiceKind::RetryLibrary, item))
                .await
            {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Queue a stored item again; false if it does not exist
    pub async fn retry_item(&self, item_id: &str) -> Result<bool> {
        let Some(item) = self.store.get(item_id).await? else {
            return Ok(false);
        };
        self.events
            .add_event(Event::new(ServiceKind::RetryLibrary, item))
            .await;
        Ok(true)
    }

    /// Forget download progress of an item and send it back to scraping
    pub async fn reset_item(&self, item_id: &str) -> Result<bool> {
        let Some(mut item) = self.store.get(item_id).await? else {
            return Ok(false);
        };
        self.events.cancel_job(item_id).await;
        item.reset();
        self.persist(&item).await?;
        info!(item = %item_id, "Reset item");
        self.events
            .add_event(Event::new(ServiceKind::StateTransition, item))
            .await;
        Ok(true)
    }

    /// Cancel jobs, delete the item and its symlinks
    pub async fn remove_item(&self, item_id: &str) -> Result<bool> {
        let Some(item) = self.store.get(item_id).await? else {
            return Ok(false);
        };
        self.events.cancel_job(item_id).await;
        self.store.delete(item_id).await?;

        let services = self.services().await;
        if services.symlinker.initialized() {
            if let Err(e) = services.symlinker.delete_item_symlinks(&item, ItemPath::ROOT) {
                warn!(item = %item_id, error = %e, "Failed to delete symlinks");
            }
        }

        info!(item = %item_id, "Removed item");
        self.bus.emit_lossy(FerryEvent::ItemRemoved {
            item_id: item_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(true)
    }
}
