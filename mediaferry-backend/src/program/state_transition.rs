//! Routing of a finished event to the next pipeline service
//!
//! [`process_event`] looks at the state of the node an event points at and
//! decides which service works on it next and which root copy gets stored.

use crate::services::{ServiceKind, ServiceRegistry};
use chrono::{DateTime, Utc};
use mediaferry_common::media::{ItemKind, ItemPath, MediaItem, State};
use tracing::debug;

/// A node to hand to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub service: ServiceKind,
    pub path: ItemPath,
}

impl Submission {
    fn new(service: ServiceKind, path: ItemPath) -> Self {
        Self { service, path }
    }
}

/// Result of routing one event
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    /// Root to persist, if the event changed it
    pub updated: Option<MediaItem>,
    /// Root the submissions refer to
    pub root: MediaItem,
    /// Service shared by every submission, if there is exactly one
    pub next_service: Option<ServiceKind>,
    pub submissions: Vec<Submission>,
}

impl ProcessedEvent {
    fn finished(root: MediaItem, updated: bool) -> Self {
        Self {
            updated: updated.then(|| root.clone()),
            root,
            next_service: None,
            submissions: Vec::new(),
        }
    }

    fn with(root: MediaItem, updated: bool, submissions: Vec<Submission>) -> Self {
        let next_service = match submissions.first() {
            Some(first) if submissions.iter().all(|s| s.service == first.service) => {
                Some(first.service)
            }
            _ => None,
        };
        Self {
            updated: updated.then(|| root.clone()),
            root,
            next_service,
            submissions,
        }
    }
}

/// Services that return a modified subtree of the root they were given
fn is_pipeline(kind: ServiceKind) -> bool {
    matches!(
        kind,
        ServiceKind::Scraping | ServiceKind::RealDebrid | ServiceKind::Symlinker | ServiceKind::PlexUpdater
    )
}

/// Fold a service result into the stored copy of the same root
///
/// The indexer result carries fresh metadata for the whole tree. Every other
/// service only changed the subtree at `path`, which is grafted onto the
/// stored root so parallel jobs on sibling nodes do not overwrite each other.
fn reconcile(existing: Option<&MediaItem>, emitted_by: ServiceKind, item: MediaItem, path: ItemPath) -> MediaItem {
    let Some(existing) = existing else {
        return item;
    };
    match emitted_by {
        ServiceKind::TraktIndexer => {
            let mut merged = existing.clone();
            merged.fill_in_missing_children(&item);
            merged.copy_other_media_attr(&item);
            merged.indexed_at = item.indexed_at;
            merged.refresh_child_ids();
            merged.propagate_attributes_to_children();
            merged
        }
        kind if is_pipeline(kind) => {
            let mut merged = existing.clone();
            match item.node(path) {
                Some(node) if merged.graft(path, node.clone()) => merged,
                _ => item,
            }
        }
        ServiceKind::StateTransition | ServiceKind::RetryLibrary => existing.clone(),
        _ => item,
    }
}

/// Decide what happens after `emitted_by` produced `item`
///
/// `existing` is the stored copy of the same root, if any.
pub fn process_event(
    existing: Option<&MediaItem>,
    emitted_by: ServiceKind,
    item: MediaItem,
    path: ItemPath,
    services: &ServiceRegistry,
    now: DateTime<Utc>,
) -> ProcessedEvent {
    let state = item.node(path).map(|n| n.state()).unwrap_or(State::Unknown);
    let needs_index = emitted_by.is_source()
        || state == State::Requested
        || (state == State::Unknown && item.indexed_at.is_none());

    if needs_index && emitted_by != ServiceKind::TraktIndexer {
        if let Some(existing) = existing {
            if !services.indexer.should_submit(existing, now) {
                debug!(item = %item.item_id, "Already indexed recently");
                return ProcessedEvent::finished(existing.clone(), false);
            }
        }
        // Seasons and episodes are indexed through their show
        return ProcessedEvent::with(
            item,
            false,
            vec![Submission::new(ServiceKind::TraktIndexer, ItemPath::ROOT)],
        );
    }

    let updated = emitted_by == ServiceKind::TraktIndexer || is_pipeline(emitted_by);
    let root = reconcile(existing, emitted_by, item, path);
    let path = if root.node(path).is_some() { path } else { ItemPath::ROOT };

    if emitted_by == ServiceKind::TraktIndexer && root.state() == State::Completed {
        return ProcessedEvent::finished(root, true);
    }

    let router = Router { services, now };
    let mut submissions = Vec::new();
    router.route(&root, path, emitted_by, &mut submissions);
    ProcessedEvent::with(root, updated, submissions)
}

struct Router<'a> {
    services: &'a ServiceRegistry,
    now: DateTime<Utc>,
}

impl Router<'_> {
    fn route(&self, root: &MediaItem, path: ItemPath, emitted_by: ServiceKind, out: &mut Vec<Submission>) {
        let Some(node) = root.node(path) else {
            return;
        };
        match node.state() {
            State::Indexed => {
                if emitted_by != ServiceKind::Scraping && self.services.scraping.can_scrape(node, self.now) {
                    out.push(Submission::new(ServiceKind::Scraping, path));
                } else {
                    self.route_children(root, path, out);
                }
            }
            State::PartiallyCompleted | State::Unknown => self.route_children(root, path, out),
            State::Scraped => out.push(Submission::new(ServiceKind::RealDebrid, path)),
            State::Downloaded => {
                for leaf in leaf_paths(root, path) {
                    let Some(leaf_node) = root.node(leaf) else {
                        continue;
                    };
                    if leaf_node.state() == State::Downloaded && self.services.symlinker.should_submit(leaf_node) {
                        out.push(Submission::new(ServiceKind::Symlinker, leaf));
                    }
                }
            }
            // The updater refreshes every pending episode below the node
            State::Symlinked => out.push(Submission::new(ServiceKind::PlexUpdater, path)),
            State::Requested | State::Completed | State::Failed => {}
        }
    }

    fn route_children(&self, root: &MediaItem, path: ItemPath, out: &mut Vec<Submission>) {
        let Some(node) = root.node(path) else {
            return;
        };
        for child in node.children.iter().filter(|c| c.state() != State::Completed) {
            let Some(number) = child.number else {
                continue;
            };
            let child_path = match path.season {
                None => ItemPath::season(number),
                Some(season) if path.episode.is_none() => ItemPath::episode(season, number),
                Some(_) => continue,
            };
            self.route(root, child_path, ServiceKind::StateTransition, out);
        }
    }
}

/// Movie or episode paths at or below `path`
fn leaf_paths(root: &MediaItem, path: ItemPath) -> Vec<ItemPath> {
    match root.kind {
        ItemKind::Show => root
            .episode_paths()
            .into_iter()
            .filter(|p| path.overlaps(p))
            .collect(),
        _ => vec![ItemPath::ROOT],
    }
}
