//! Debrid downloaders

mod realdebrid;

pub use realdebrid::{RealDebrid, WANTED_EXTENSIONS};
