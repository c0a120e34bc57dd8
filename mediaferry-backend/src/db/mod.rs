//! Persistence of root media items

pub mod items;

pub use items::{ItemFilter, MediaStore, SortOrder, StoreStats};
