//! Watchlist sources
//!
//! Each source yields bare `MediaItem::requested` items; indexing fills in
//! the rest.

mod listrr;
mod mdblist;
mod overseerr;
mod plex_watchlist;
mod trakt;

pub use listrr::Listrr;
pub use mdblist::Mdblist;
pub use overseerr::{Overseerr, OverseerrMedia};
pub use plex_watchlist::PlexWatchlist;
pub use trakt::TraktContent;

/// Whether a string looks like an IMDb title id
pub fn is_imdb_id(id: &str) -> bool {
    id.len() > 2 && id.starts_with("tt") && id[2..].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_imdb_id() {
        assert!(is_imdb_id("tt0133093"));
        assert!(!is_imdb_id("tt"));
        assert!(!is_imdb_id("nm0000206"));
        assert!(!is_imdb_id("tt01a"));
    }
}
