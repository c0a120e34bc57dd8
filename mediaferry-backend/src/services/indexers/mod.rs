//! Metadata indexers

mod trakt;

pub use trakt::{TraktIndexer, TRAKT_CLIENT_ID};
