use super::path::{ItemContext, ItemPath};
use super::state::State;
use super::stream::{ActiveStream, Stream};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Symlink attempts after which a leaf is considered Failed
pub const MAX_SYMLINK_ATTEMPTS: u32 = 3;

/// What a node in the tree represents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// An IMDb id from a watchlist or the API that has not been indexed yet
    #[default]
    Requested,
    Movie,
    Show,
    Season,
    Episode,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Requested => "requested",
            ItemKind::Movie => "movie",
            ItemKind::Show => "show",
            ItemKind::Season => "season",
            ItemKind::Episode => "episode",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requested" => Ok(ItemKind::Requested),
            "movie" => Ok(ItemKind::Movie),
            "show" => Ok(ItemKind::Show),
            "season" => Ok(ItemKind::Season),
            "episode" => Ok(ItemKind::Episode),
            _ => Err(format!("Invalid type: {}", s)),
        }
    }
}

/// A node of the media tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaItem {
    /// Roots: the IMDb id. Children: `<parent id>/<number>`.
    pub item_id: String,
    pub kind: ItemKind,
    /// Season or episode number
    pub number: Option<u32>,

    pub title: Option<String>,
    pub imdb_id: Option<String>,
    pub tvdb_id: Option<String>,
    pub tmdb_id: Option<String>,
    pub network: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub aired_at: Option<DateTime<Utc>>,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub is_anime: bool,

    pub requested_at: Option<DateTime<Utc>>,
    pub requested_by: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,

    pub scraped_at: Option<DateTime<Utc>>,
    pub scraped_times: u32,
    pub streams: Vec<Stream>,
    pub active_stream: Option<ActiveStream>,

    pub symlinked: bool,
    pub symlinked_at: Option<DateTime<Utc>>,
    pub symlinked_times: u32,

    pub file: Option<String>,
    pub folder: Option<String>,
    pub alternative_folder: Option<String>,

    /// Plex rating key, once the media server knows the item
    pub key: Option<String>,
    pub guid: Option<String>,
    /// Library folder awaiting a media server refresh, or `"updated"`
    pub update_folder: Option<String>,
    pub overseerr_id: Option<i64>,

    /// Seasons of a show or episodes of a season, sorted by number
    pub children: Vec<MediaItem>,
}

impl MediaItem {
    /// A bare request for an IMDb id
    pub fn requested(imdb_id: &str, requested_by: &str) -> Self {
        Self {
            item_id: imdb_id.to_string(),
            kind: ItemKind::Requested,
            imdb_id: Some(imdb_id.to_string()),
            requested_by: Some(requested_by.to_string()),
            requested_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn movie(imdb_id: &str) -> Self {
        Self {
            item_id: imdb_id.to_string(),
            kind: ItemKind::Movie,
            imdb_id: Some(imdb_id.to_string()),
            ..Default::default()
        }
    }

    pub fn show(imdb_id: &str) -> Self {
        Self {
            item_id: imdb_id.to_string(),
            kind: ItemKind::Show,
            imdb_id: Some(imdb_id.to_string()),
            ..Default::default()
        }
    }

    pub fn season(number: u32) -> Self {
        Self {
            item_id: number.to_string(),
            kind: ItemKind::Season,
            number: Some(number),
            ..Default::default()
        }
    }

    pub fn episode(number: u32) -> Self {
        Self {
            item_id: number.to_string(),
            kind: ItemKind::Episode,
            number: Some(number),
            ..Default::default()
        }
    }

    // ========================================
    // Tree access
    // ========================================

    /// Insert a season (into a show) or an episode (into a season)
    ///
    /// Children are kept sorted and unique by number. Returns false when a
    /// child with that number already exists.
    pub fn add_child(&mut self, mut child: MediaItem) -> bool {
        let Some(number) = child.number else {
            return false;
        };
        match self.children.binary_search_by_key(&Some(number), |c| c.number) {
            Ok(_) => false,
            Err(pos) => {
                child.is_anime |= self.is_anime;
                child.assign_ids(&self.item_id);
                self.children.insert(pos, child);
                true
            }
        }
    }

    fn assign_ids(&mut self, parent_id: &str) {
        if let Some(number) = self.number {
            self.item_id = format!("{}/{}", parent_id, number);
        }
        let id = self.item_id.clone();
        for child in &mut self.children {
            child.assign_ids(&id);
        }
    }

    /// Re-derive child ids after the root id changed
    pub fn refresh_child_ids(&mut self) {
        let id = self.item_id.clone();
        for child in &mut self.children {
            child.assign_ids(&id);
        }
    }

    pub fn child(&self, number: u32) -> Option<&MediaItem> {
        self.children.iter().find(|c| c.number == Some(number))
    }

    pub fn child_mut(&mut self, number: u32) -> Option<&mut MediaItem> {
        self.children.iter_mut().find(|c| c.number == Some(number))
    }

    pub fn node(&self, path: ItemPath) -> Option<&MediaItem> {
        match (path.season, path.episode) {
            (None, _) => Some(self),
            (Some(s), None) => self.child(s),
            (Some(s), Some(e)) => self.child(s)?.child(e),
        }
    }

    pub fn node_mut(&mut self, path: ItemPath) -> Option<&mut MediaItem> {
        match (path.season, path.episode) {
            (None, _) => Some(self),
            (Some(s), None) => self.child_mut(s),
            (Some(s), Some(e)) => self.child_mut(s)?.child_mut(e),
        }
    }

    pub fn context(&self, path: ItemPath) -> Option<ItemContext<'_>> {
        let season = match path.season {
            Some(s) => Some(self.child(s)?),
            None => None,
        };
        let episode = match (season, path.episode) {
            (Some(season), Some(e)) => Some(season.child(e)?),
            _ => None,
        };
        Some(ItemContext {
            root: self,
            season,
            episode,
        })
    }

    /// Replace the node at `path` with `node`. Returns false if absent.
    pub fn graft(&mut self, path: ItemPath, node: MediaItem) -> bool {
        match self.node_mut(path) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }

    /// Paths of every episode below this root
    pub fn episode_paths(&self) -> Vec<ItemPath> {
        match self.kind {
            ItemKind::Show => self
                .children
                .iter()
                .filter_map(|season| {
                    let s = season.number?;
                    Some(
                        season
                            .children
                            .iter()
                            .filter_map(move |e| e.number.map(|e| ItemPath::episode(s, e))),
                    )
                })
                .flatten()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Movie and episode nodes below (and including) this node
    pub fn leaves(&self) -> Vec<&MediaItem> {
        if self.children.is_empty() {
            return vec![self];
        }
        self.children.iter().flat_map(|c| c.leaves()).collect()
    }

    // ========================================
    // State
    // ========================================

    pub fn state(&self) -> State {
        match self.kind {
            ItemKind::Season if self.children.is_empty() => State::Unknown,
            ItemKind::Season | ItemKind::Show if !self.children.is_empty() => {
                self.aggregate_state()
            }
            _ => self.leaf_state(),
        }
    }

    fn leaf_state(&self) -> State {
        if self.key.is_some() || self.update_folder.as_deref() == Some("updated") {
            State::Completed
        } else if self.symlinked {
            State::Symlinked
        } else if self.symlinked_times >= MAX_SYMLINK_ATTEMPTS {
            State::Failed
        } else if self.file.is_some() && self.folder.is_some() {
            State::Downloaded
        } else if !self.streams.is_empty() {
            State::Scraped
        } else if self.title.is_some() {
            State::Indexed
        } else if self.imdb_id.is_some() && self.requested_by.is_some() {
            State::Requested
        } else {
            State::Unknown
        }
    }

    /// Seasons roll up their episodes and shows their seasons. The two differ
    /// only in the Downloaded and PartiallyCompleted rules.
    fn aggregate_state(&self) -> State {
        let states: Vec<State> = self.children.iter().map(|c| c.state()).collect();
        let all = |state: State| states.iter().all(|s| *s == state);
        let any = |state: State| states.iter().any(|s| *s == state);
        let season = self.kind == ItemKind::Season;

        let downloaded = if season {
            self.children.iter().all(|c| c.file.is_some() && c.folder.is_some())
        } else {
            all(State::Downloaded)
        };

        if all(State::Completed) {
            State::Completed
        } else if all(State::Symlinked) {
            State::Symlinked
        } else if downloaded {
            State::Downloaded
        } else if !self.streams.is_empty() {
            State::Scraped
        } else if any(State::Completed) || (!season && any(State::PartiallyCompleted)) {
            State::PartiallyCompleted
        } else if any(State::Indexed) {
            State::Indexed
        } else if any(State::Requested) {
            State::Requested
        } else {
            State::Unknown
        }
    }

    /// Whether the item has aired by `now`
    pub fn is_released(&self, now: DateTime<Utc>) -> bool {
        if !self.children.is_empty() {
            return self.children.iter().any(|c| c.is_released(now));
        }
        self.aired_at.map(|aired| aired <= now).unwrap_or(false)
    }

    // ========================================
    // Merging
    // ========================================

    /// Add seasons and episodes present in `other` but missing here
    pub fn fill_in_missing_children(&mut self, other: &MediaItem) {
        for other_child in &other.children {
            let Some(number) = other_child.number else {
                continue;
            };
            match self.child_mut(number) {
                Some(existing) => existing.fill_in_missing_children(other_child),
                None => {
                    self.add_child(other_child.clone());
                }
            }
        }
    }

    /// Copy descriptive metadata from another copy of the same item
    pub fn copy_other_media_attr(&mut self, other: &MediaItem) {
        if other.kind != ItemKind::Requested {
            self.kind = other.kind;
        }
        self.title = other.title.clone();
        if other.imdb_id.is_some() {
            self.imdb_id = other.imdb_id.clone();
        }
        self.tvdb_id = other.tvdb_id.clone();
        self.tmdb_id = other.tmdb_id.clone();
        self.network = other.network.clone();
        self.country = other.country.clone();
        self.language = other.language.clone();
        self.aired_at = other.aired_at;
        self.year = other.year;
        self.genres = other.genres.clone();
        self.is_anime = other.is_anime;
        if other.overseerr_id.is_some() {
            self.overseerr_id = other.overseerr_id;
        }
    }

    /// Push show-level metadata down into seasons and episodes that lack it
    pub fn propagate_attributes_to_children(&mut self) {
        let genres = self.genres.clone();
        let country = self.country.clone();
        let network = self.network.clone();
        let language = self.language.clone();
        let is_anime = self.is_anime;
        for child in &mut self.children {
            if child.genres.is_empty() {
                child.genres = genres.clone();
            }
            if child.country.is_none() {
                child.country = country.clone();
            }
            if child.network.is_none() {
                child.network = network.clone();
            }
            if child.language.is_none() {
                child.language = language.clone();
            }
            child.is_anime |= is_anime;
            child.propagate_attributes_to_children();
        }
    }

    /// Forget download progress so the item goes back through scraping
    pub fn reset(&mut self) {
        self.scraped_at = None;
        self.scraped_times = 0;
        self.streams.clear();
        self.active_stream = None;
        self.symlinked = false;
        self.symlinked_at = None;
        self.symlinked_times = 0;
        self.file = None;
        self.folder = None;
        self.alternative_folder = None;
        self.update_folder = None;
        self.key = None;
        for child in &mut self.children {
            child.reset();
        }
    }

    /// Add streams not already present (by infohash)
    pub fn add_streams(&mut self, streams: impl IntoIterator<Item = Stream>) -> usize {
        let mut added = 0;
        for stream in streams {
            if !self.streams.iter().any(|s| s.infohash == stream.infohash) {
                self.streams.push(stream);
                added += 1;
            }
        }
        added
    }

    // ========================================
    // API views
    // ========================================

    pub fn to_summary(&self) -> Value {
        json!({
            "item_id": self.item_id,
            "title": self.title,
            "type": self.kind.as_str(),
            "imdb_id": self.imdb_id,
            "tvdb_id": self.tvdb_id,
            "tmdb_id": self.tmdb_id,
            "state": self.state().as_str(),
            "imdb_link": self.imdb_id.as_ref().map(|id| format!("https://www.imdb.com/title/{}/", id)),
            "aired_at": self.aired_at,
            "genres": self.genres,
            "is_anime": self.is_anime,
            "guid": self.guid,
            "requested_at": self.requested_at,
            "requested_by": self.requested_by,
            "scraped_at": self.scraped_at,
            "scraped_times": self.scraped_times,
        })
    }

    pub fn to_extended(&self) -> Value {
        let mut value = self.to_summary();
        if let Value::Object(map) = &mut value {
            map.insert("number".into(), json!(self.number));
            map.insert("year".into(), json!(self.year));
            map.insert("network".into(), json!(self.network));
            map.insert("country".into(), json!(self.country));
            map.insert("language".into(), json!(self.language));
            map.insert("indexed_at".into(), json!(self.indexed_at));
            map.insert("streams".into(), json!(self.streams));
            map.insert("active_stream".into(), json!(self.active_stream));
            map.insert("symlinked".into(), json!(self.symlinked));
            map.insert("symlinked_at".into(), json!(self.symlinked_at));
            map.insert("symlinked_times".into(), json!(self.symlinked_times));
            map.insert("file".into(), json!(self.file));
            map.insert("folder".into(), json!(self.folder));
            map.insert("alternative_folder".into(), json!(self.alternative_folder));
            map.insert("update_folder".into(), json!(self.update_folder));
            map.insert("key".into(), json!(self.key));
            map.insert("overseerr_id".into(), json!(self.overseerr_id));
            let children: Vec<Value> = self.children.iter().map(|c| c.to_extended()).collect();
            match self.kind {
                ItemKind::Show => {
                    map.insert("seasons".into(), Value::Array(children));
                }
                ItemKind::Season => {
                    map.insert("episodes".into(), Value::Array(children));
                }
                _ => {}
            }
        }
        value
    }
}
