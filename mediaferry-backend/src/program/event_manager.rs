//! Event queue and per-service job runner
//!
//! Queued events wait for the program loop. Jobs run services on tokio tasks,
//! bounded per service by a semaphore, and feed their result back into the
//! queue as a new event.

use crate::services::{Service, ServiceKind};
use chrono::{DateTime, Utc};
use mediaferry_common::events::{EventBus, FerryEvent};
use mediaferry_common::media::{ItemPath, MediaItem};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

/// A root item waiting for (or handed to) a service
#[derive(Debug, Clone)]
pub struct Event {
    pub emitted_by: ServiceKind,
    pub item: MediaItem,
    pub path: ItemPath,
    pub run_at: DateTime<Utc>,
}

impl Event {
    pub fn new(emitted_by: ServiceKind, item: MediaItem) -> Self {
        Self {
            emitted_by,
            item,
            path: ItemPath::ROOT,
            run_at: Utc::now(),
        }
    }

    pub fn at(mut self, path: ItemPath) -> Self {
        self.path = path;
        self
    }

    pub fn delayed(mut self, delay: chrono::Duration) -> Self {
        self.run_at = Utc::now() + delay;
        self
    }

    pub fn item_id(&self) -> &str {
        &self.item.item_id
    }

    fn log_string(&self) -> String {
        self.item
            .context(self.path)
            .map(|c| c.log_string())
            .unwrap_or_else(|| self.item.item_id.clone())
    }
}

struct RunningJob {
    id: u64,
    service: ServiceKind,
    item_id: String,
    path: ItemPath,
    log_string: String,
    abort: AbortHandle,
}

/// Queue contents for the API, keyed by service
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    pub queued: BTreeMap<String, Vec<String>>,
    pub running: BTreeMap<String, Vec<String>>,
    pub total_queued: usize,
    pub total_running: usize,
}

pub struct EventManager {
    queue: Mutex<Vec<Event>>,
    running: Mutex<Vec<RunningJob>>,
    semaphores: Mutex<HashMap<ServiceKind, Arc<Semaphore>>>,
    next_id: AtomicU64,
    notify: Notify,
    bus: EventBus,
}

impl EventManager {
    pub fn new(bus: EventBus) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            running: Mutex::new(Vec::new()),
            semaphores: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            notify: Notify::new(),
            bus,
        }
    }

    /// Queue an event unless its root is already queued or running
    pub async fn add_event(&self, event: Event) -> bool {
        let item_id = event.item_id().to_string();
        if self.running.lock().await.iter().any(|j| j.item_id == item_id) {
            debug!(item = %item_id, "Item is already running, skipping");
            return false;
        }
        let mut queue = self.queue.lock().await;
        if queue.iter().any(|e| e.item_id() == item_id) {
            debug!(item = %item_id, "Item is already queued, skipping");
            return false;
        }
        debug!(item = %item_id, emitted_by = %event.emitted_by, "Queued event");
        queue.push(event);
        drop(queue);
        self.notify.notify_one();
        true
    }

    /// Queue an event without the duplicate check
    ///
    /// Used to retry a node of a root that still has other jobs running.
    pub async fn push(&self, event: Event) {
        self.queue.lock().await.push(event);
        self.notify.notify_one();
    }

    /// Remove and return the due event with the earliest `run_at`
    pub async fn next(&self) -> Option<Event> {
        let now = Utc::now();
        let mut queue = self.queue.lock().await;
        let index = queue
            .iter()
            .enumerate()
            .filter(|(_, e)| e.run_at <= now)
            .min_by_key(|(_, e)| e.run_at)
            .map(|(i, _)| i)?;
        Some(queue.remove(index))
    }

    /// Wait until an event is queued or `timeout` elapses
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    /// Whether a job already works on a node overlapping `path`
    pub async fn is_running(&self, item_id: &str, path: ItemPath) -> bool {
        self.running
            .lock()
            .await
            .iter()
            .any(|j| j.item_id == item_id && j.path.overlaps(&path))
    }

    async fn semaphore(&self, kind: ServiceKind) -> Arc<Semaphore> {
        self.semaphores
            .lock()
            .await
            .entry(kind)
            .or_insert_with(|| Arc::new(Semaphore::new(kind.max_workers())))
            .clone()
    }

    /// Run `service` on the event's node in the background
    ///
    /// A returned [`RunOutcome`](crate::services::RunOutcome) is queued as a
    /// new event emitted by that service.
    pub async fn submit_job(self: &Arc<Self>, service: Arc<dyn Service>, event: Event) {
        let kind = service.kind();
        let semaphore = self.semaphore(kind).await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item_id = event.item_id().to_string();
        let path = event.path;
        let log_string = event.log_string();

        // Held until the job is registered so it cannot finish unregistered
        let mut running = self.running.lock().await;
        let manager = Arc::clone(self);
        let job_item_id = item_id.clone();
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let log_string = event.log_string();
            debug!(service = %kind, item = %log_string, "Job started");
            let result = match service.run(event.item, event.path).await {
                Ok(Some(outcome)) => Some(Event {
                    emitted_by: kind,
                    item: outcome.root,
                    path: outcome.path,
                    run_at: outcome.run_at.unwrap_or_else(Utc::now),
                }),
                Ok(None) => {
                    debug!(service = %kind, item = %log_string, "Nothing to do");
                    None
                }
                Err(e) => {
                    error!(service = %kind, item = %log_string, error = %e, "Service run failed");
                    manager.bus.emit_lossy(FerryEvent::ServiceError {
                        service: kind.key().to_string(),
                        item_id: job_item_id,
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    None
                }
            };
            manager.finish(id, result).await;
        });
        running.push(RunningJob {
            id,
            service: kind,
            item_id,
            path,
            log_string,
            abort: handle.abort_handle(),
        });
    }

    /// Swap a finished job for its result in one step
    async fn finish(&self, id: u64, result: Option<Event>) {
        let mut running = self.running.lock().await;
        running.retain(|j| j.id != id);
        if let Some(event) = result {
            self.queue.lock().await.push(event);
        }
        drop(running);
        self.notify.notify_one();
    }

    /// Abort running jobs and drop queued events of a root item
    pub async fn cancel_job(&self, item_id: &str) -> usize {
        let mut cancelled = 0;
        {
            let mut running = self.running.lock().await;
            running.retain(|job| {
                if job.item_id == item_id {
                    job.abort.abort();
                    cancelled += 1;
                    false
                } else {
                    true
                }
            });
        }
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|e| e.item_id() != item_id);
        cancelled += before - queue.len();
        if cancelled > 0 {
            info!(item = %item_id, cancelled, "Cancelled jobs");
        }
        cancelled
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let mut snapshot = QueueSnapshot::default();
        for event in self.queue.lock().await.iter() {
            snapshot
                .queued
                .entry(event.emitted_by.key().to_string())
                .or_default()
                .push(event.log_string());
            snapshot.total_queued += 1;
        }
        for job in self.running.lock().await.iter() {
            snapshot
                .running
                .entry(job.service.key().to_string())
                .or_default()
                .push(job.log_string.clone());
            snapshot.total_running += 1;
        }
        snapshot
    }

    pub async fn queued_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn running_len(&self) -> usize {
        self.running.lock().await.len()
    }
}
