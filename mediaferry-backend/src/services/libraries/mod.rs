//! Existing libraries scanned on a cold start

mod symlink;

pub use symlink::SymlinkLibrary;
