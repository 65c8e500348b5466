use std::io;
use thiserror::Error;

/// Error type for the netwatch library
#[derive(Error, Debug)]
pub enum NetwatchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Interface vanished: {0}")]
    InterfaceVanished(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The database file is damaged. Never retried.
    #[error("Storage corrupted: {0}")]
    StorageCorrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for netwatch
pub type Result<T> = std::result::Result<T, NetwatchError>;

impl NetwatchError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        NetwatchError::Config(msg.into())
    }

    pub fn capture_unavailable<S: Into<String>>(msg: S) -> Self {
        NetwatchError::CaptureUnavailable(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        NetwatchError::PermissionDenied(msg.into())
    }

    pub fn interface_vanished<S: Into<String>>(msg: S) -> Self {
        NetwatchError::InterfaceVanished(msg.into())
    }

    pub fn storage_corrupted<S: Into<String>>(msg: S) -> Self {
        NetwatchError::StorageCorrupted(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        NetwatchError::Other(msg.into())
    }

    /// Only a corrupted store may terminate the tick loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NetwatchError::StorageCorrupted(_))
    }

    /// Acquisition failures trigger a downgrade to Basic mode.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            NetwatchError::CaptureUnavailable(_)
                | NetwatchError::PermissionDenied(_)
                | NetwatchError::InterfaceVanished(_)
        )
    }
}

impl From<rusqlite::Error> for NetwatchError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => {
                NetwatchError::StorageCorrupted(err.to_string())
            }
            _ => NetwatchError::Storage(err.to_string()),
        }
    }
}
