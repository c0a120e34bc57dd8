use serde::{Deserialize, Serialize};

/// A candidate torrent release found by a scraper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    /// Lower-case infohash, unique within an item
    pub infohash: String,
    pub raw_title: String,
    /// Position assigned by the release ranking; higher is better
    #[serde(default)]
    pub rank: i64,
    /// Last debrid availability verdict, if checked
    #[serde(default)]
    pub cached: Option<bool>,
}

impl Stream {
    pub fn new(infohash: &str, raw_title: &str) -> Self {
        Self {
            infohash: infohash.to_lowercase(),
            raw_title: raw_title.to_string(),
            rank: 0,
            cached: None,
        }
    }
}

/// A file inside a debrid torrent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebridFile {
    pub id: u64,
    pub filename: String,
    pub filesize: u64,
}

/// The stream chosen for download and its debrid-side identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveStream {
    pub hash: String,
    /// Debrid torrent id, once added
    #[serde(default)]
    pub id: Option<String>,
    /// Torrent folder name on the mount
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Vec<DebridFile>,
}
