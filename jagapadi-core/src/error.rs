//! Error types for jagapadi-core

use thiserror::Error;

use crate::types::WorkflowState;

/// Main error type for the jagapadi-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Selected file is not an image
    #[error("invalid file type: {mime}")]
    InvalidFileType { mime: String },

    /// Selected file exceeds the upload limit
    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    /// Image bytes could not be turned into a displayable encoding
    #[error("decode error: {0}")]
    Decode(String),

    /// Connect was requested without a credential
    #[error("missing credential")]
    MissingCredential,

    /// Detection was requested with nothing staged
    #[error("no image staged")]
    NoImageStaged,

    /// Detection was requested while the session is not connected
    #[error("not connected to the detection service")]
    NotConnected,

    /// A detection is already being processed
    #[error("detection already in progress")]
    DetectionInProgress,

    /// The workflow refused a transition
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// The service answered with `success: false`
    #[error("rejected by service: {0}")]
    Rejected(String),

    /// Network failure or unusable response
    #[error("transport error: {0}")]
    Transport(String),

    /// Key-value store failure
    #[error("store error: {0}")]
    Store(String),

    /// History record not found
    #[error("record not found: {0}")]
    RecordNotFound(String),
}

impl Error {
    /// Message suitable for showing to the person driving the UI.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidFileType { .. } => "Please select a valid image file".to_string(),
            Error::FileTooLarge { .. } => "File is too large (maximum 10MB)".to_string(),
            Error::Decode(_) => "Failed to load image".to_string(),
            Error::MissingCredential => "Enter a password".to_string(),
            Error::NoImageStaged => "No image to analyze".to_string(),
            Error::NotConnected => "Connect to the server first".to_string(),
            Error::DetectionInProgress => "A detection is already running".to_string(),
            Error::Rejected(message) => message.clone(),
            Error::Transport(_) => "Failed to reach the detection server".to_string(),
            Error::RecordNotFound(_) => "History entry not found".to_string(),
            other => other.to_string(),
        }
    }

    /// Validation errors are raised before any state is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidFileType { .. } | Error::FileTooLarge { .. } | Error::MissingCredential
        )
    }
}

/// Result type alias for jagapadi-core
pub type Result<T> = std::result::Result<T, Error>;
