//! Media item tree
//!
//! A root item (a movie, a show, or a request that has not been indexed
//! yet) owns its whole subtree: shows own seasons and seasons own episodes.
//! Nodes below the root are addressed with [`ItemPath`].

mod item;
mod path;
mod state;
mod stream;

pub use item::{ItemKind, MediaItem, MAX_SYMLINK_ATTEMPTS};
pub use path::{ItemContext, ItemPath};
pub use state::State;
pub use stream::{ActiveStream, DebridFile, Stream};
