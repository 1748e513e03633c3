//! Error types for the nwmon-monitor crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No device matches {0:?}")]
    NotFound(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
