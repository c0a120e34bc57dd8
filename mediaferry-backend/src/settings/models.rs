//! Runtime settings model
//!
//! Serialized as `settings.json`. Every field has a default so older or
//! partial files keep loading; unknown keys are ignored on load.

use serde::{Deserialize, Serialize};

/// Current settings schema version
pub const SETTINGS_VERSION: &str = "0.4.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: String,
    pub debug: bool,
    pub log: bool,
    pub plex: PlexSettings,
    pub real_debrid: RealDebridSettings,
    pub symlink: SymlinkSettings,
    pub content: ContentSettings,
    pub indexer: IndexerSettings,
    pub scraping: ScrapingSettings,
    pub parser: ParserSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION.to_string(),
            debug: false,
            log: true,
            plex: PlexSettings::default(),
            real_debrid: RealDebridSettings::default(),
            symlink: SymlinkSettings::default(),
            content: ContentSettings::default(),
            indexer: IndexerSettings::default(),
            scraping: ScrapingSettings::default(),
            parser: ParserSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlexSettings {
    pub user: String,
    pub token: String,
    pub url: String,
}

impl Default for PlexSettings {
    fn default() -> Self {
        Self {
            user: String::new(),
            token: String::new(),
            url: "http://localhost:32400".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealDebridSettings {
    pub api_key: String,
    /// Base URL of the REST API
    pub url: String,
}

impl Default for RealDebridSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: "https://api.real-debrid.com/rest/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymlinkSettings {
    /// Mount point of the debrid rclone remote
    pub rclone_path: String,
    /// Root of the generated library
    pub library_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub overseerr: OverseerrSettings,
    pub plex_watchlist: PlexWatchlistSettings,
    pub listrr: ListrrSettings,
    pub mdblist: MdblistSettings,
    pub trakt: TraktContentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerrSettings {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub update_interval: u64,
}

impl Default for OverseerrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:5055".to_string(),
            api_key: String::new(),
            update_interval: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlexWatchlistSettings {
    pub enabled: bool,
    /// Optional Plex RSS feed URL
    pub rss: String,
    /// Watchlist metadata endpoint
    pub url: String,
    pub update_interval: u64,
}

impl Default for PlexWatchlistSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rss: String::new(),
            url: "https://metadata.provider.plex.tv".to_string(),
            update_interval: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListrrSettings {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub movie_lists: Vec<String>,
    pub show_lists: Vec<String>,
    pub update_interval: u64,
}

impl Default for ListrrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://listrr.pro".to_string(),
            api_key: String::new(),
            movie_lists: Vec::new(),
            show_lists: Vec::new(),
            update_interval: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MdblistSettings {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub lists: Vec<String>,
    pub update_interval: u64,
}

impl Default for MdblistSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://mdblist.com".to_string(),
            api_key: String::new(),
            lists: Vec::new(),
            update_interval: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraktContentSettings {
    pub enabled: bool,
    pub api_key: String,
    pub username: String,
    pub watchlist: bool,
    /// `user/slug` pairs
    pub user_lists: Vec<String>,
    pub update_interval: u64,
}

impl Default for TraktContentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            username: String::new(),
            watchlist: true,
            user_lists: Vec::new(),
            update_interval: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// Seconds before an indexed item is refreshed from Trakt
    pub update_interval: u64,
    pub url: String,
    /// Trakt client id; empty uses the built-in one
    pub api_key: String,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            update_interval: 3600,
            url: "https://api.trakt.tv".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingSettings {
    /// Hours between scrapes after the 2nd attempt
    pub after_2: f64,
    /// Hours between scrapes after the 5th attempt
    pub after_5: f64,
    /// Hours between scrapes after the 10th attempt
    pub after_10: f64,
    pub torrentio: TorrentioSettings,
    pub jackett: JackettSettings,
    pub orionoid: OrionoidSettings,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            after_2: 0.5,
            after_5: 2.0,
            after_10: 24.0,
            torrentio: TorrentioSettings::default(),
            jackett: JackettSettings::default(),
            orionoid: OrionoidSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentioSettings {
    pub enabled: bool,
    pub url: String,
    pub filter: String,
}

impl Default for TorrentioSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://torrentio.strem.fun".to_string(),
            filter: "sort=qualitysize%7Cqualityfilter=480p,scr,cam,unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JackettSettings {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
}

impl Default for JackettSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:9117".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrionoidSettings {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    pub limitcount: u32,
}

impl Default for OrionoidSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.orionoid.com".to_string(),
            api_key: String::new(),
            limitcount: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSettings {
    pub highest_quality: bool,
    pub include_4k: bool,
    pub repack_proper: bool,
    pub dual_audio: bool,
    pub av1_audio: bool,
    pub language: Vec<String>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            highest_quality: false,
            include_4k: false,
            repack_proper: true,
            dual_audio: false,
            av1_audio: false,
            language: vec!["English".to_string()],
        }
    }
}
