//! Media server refreshes

mod plex;

pub use plex::PlexUpdater;
