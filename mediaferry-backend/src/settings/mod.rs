//! Runtime settings (`settings.json`)

mod manager;
mod models;

pub use manager::{SettingsError, SettingsManager};
pub use models::*;

use crate::error::ApiError;

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::UnknownKey(_) | SettingsError::InvalidValue { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            SettingsError::Parse { .. } => ApiError::BadRequest(err.to_string()),
            SettingsError::Io(e) => ApiError::Io(e),
            SettingsError::Serialization(e) => ApiError::Internal(e.to_string()),
        }
    }
}
