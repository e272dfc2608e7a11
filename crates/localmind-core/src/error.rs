//! Error types for LocalMind.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model {model_id} cannot run on this device: {reason}")]
    Incompatible { model_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is a rejection the caller should show to the user.
    ///
    /// Everything else is handled inside the core by degrading.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::ModelNotFound(_) | Error::Incompatible { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
