//! Database initialization

pub mod init;

pub use init::{create_tables, init_database};
