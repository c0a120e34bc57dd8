//! # MediaFerry Common Library
//!
//! Shared code for the MediaFerry backend:
//! - Media item tree and state determination
//! - Event types (FerryEvent enum) and the broadcast EventBus
//! - Root folder and TOML bootstrap configuration
//! - SQLite initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod media;

pub use error::{Error, Result};
pub use media::{ItemKind, ItemPath, MediaItem, State};
