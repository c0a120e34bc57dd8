//! HTTP API handlers
//!
//! Every module exposes a `*_routes()` builder merged in [`crate::build_router`].

pub mod default;
pub mod items;
pub mod settings;
pub mod sse;
pub mod webhooks;

pub use default::default_routes;
pub use items::item_routes;
pub use settings::settings_routes;
pub use sse::event_stream;
pub use webhooks::webhook_routes;
