use super::item::{ItemKind, MediaItem};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a node relative to its root item
///
/// `{None, None}` is the root itself, `{Some(s), None}` a season and
/// `{Some(s), Some(e)}` an episode of that season.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemPath {
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ItemPath {
    pub const ROOT: ItemPath = ItemPath {
        season: None,
        episode: None,
    };

    pub fn season(season: u32) -> Self {
        Self {
            season: Some(season),
            episode: None,
        }
    }

    pub fn episode(season: u32, episode: u32) -> Self {
        Self {
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub fn is_root(&self) -> bool {
        self.season.is_none()
    }

    /// Whether one path contains the other (or they are the same node)
    pub fn overlaps(&self, other: &ItemPath) -> bool {
        if self.is_root() || other.is_root() {
            return true;
        }
        if self.season != other.season {
            return false;
        }
        self.episode.is_none() || other.episode.is_none() || self.episode == other.episode
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (None, _) => Ok(()),
            (Some(s), None) => write!(f, "S{:02}", s),
            (Some(s), Some(e)) => write!(f, "S{:02}E{:02}", s, e),
        }
    }
}

/// A resolved node together with its ancestors
///
/// Services need the show's title, year and ids when working on an episode;
/// this gives them the whole chain without parent pointers.
#[derive(Debug, Clone, Copy)]
pub struct ItemContext<'a> {
    pub root: &'a MediaItem,
    pub season: Option<&'a MediaItem>,
    pub episode: Option<&'a MediaItem>,
}

impl<'a> ItemContext<'a> {
    /// The node the path pointed at
    pub fn target(&self) -> &'a MediaItem {
        self.episode.or(self.season).unwrap_or(self.root)
    }

    pub fn kind(&self) -> ItemKind {
        self.target().kind
    }

    pub fn path(&self) -> ItemPath {
        ItemPath {
            season: self.season.and_then(|s| s.number),
            episode: self.episode.and_then(|e| e.number),
        }
    }

    /// Title of the movie or show
    pub fn top_title(&self) -> Option<&'a str> {
        self.root.title.as_deref()
    }

    pub fn imdb_id(&self) -> Option<&'a str> {
        self.root.imdb_id.as_deref()
    }

    pub fn year(&self) -> Option<i32> {
        self.root.year
    }

    pub fn is_anime(&self) -> bool {
        self.target().is_anime || self.root.is_anime
    }

    pub fn season_number(&self) -> Option<u32> {
        self.season.and_then(|s| s.number)
    }

    pub fn episode_number(&self) -> Option<u32> {
        self.episode.and_then(|e| e.number)
    }

    /// Human readable name for logs: `Title`, `Title S01` or `Title S01E02`
    pub fn log_string(&self) -> String {
        let base = self
            .root
            .title
            .clone()
            .or_else(|| self.root.imdb_id.clone())
            .unwrap_or_else(|| self.root.item_id.clone());
        let path = self.path();
        if path.is_root() {
            base
        } else {
            format!("{} {}", base, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlaps() {
        let root = ItemPath::ROOT;
        let s1 = ItemPath::season(1);
        let s2 = ItemPath::season(2);
        let s1e1 = ItemPath::episode(1, 1);
        let s1e2 = ItemPath::episode(1, 2);

        assert!(root.overlaps(&s1e1));
        assert!(s1.overlaps(&s1e2));
        assert!(s1e1.overlaps(&s1e1));
        assert!(!s1.overlaps(&s2));
        assert!(!s1e1.overlaps(&s1e2));
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemPath::ROOT.to_string(), "");
        assert_eq!(ItemPath::season(3).to_string(), "S03");
        assert_eq!(ItemPath::episode(1, 12).to_string(), "S01E12");
    }
}
