use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for webdesk operations
#[derive(Error, Debug)]
pub enum WebdeskError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("You have no session, please log in!")]
    NoSession,

    #[error("Permission denied for: {0}")]
    PermissionDenied(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Could not find any supported VFS module: {0}")]
    NoSuchTransport(String),

    #[error("Requested range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No such module: {0}")]
    NoSuchModule(String),

    #[error("No such method: {0}")]
    NoSuchMethod(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Not yet implemented: {0}")]
    NotImplemented(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl WebdeskError {
    /// HTTP status used when this error reaches a route boundary.
    ///
    /// Most failures travel as a body-level `{error}` envelope with a 200
    /// status; only session/permission and range failures change the status.
    pub fn status_code(&self) -> u16 {
        match self {
            WebdeskError::NoSession | WebdeskError::PermissionDenied(_) => 403,
            WebdeskError::RangeNotSatisfiable(_) => 416,
            _ => 200,
        }
    }

    /// Map an I/O error onto the taxonomy, keeping the offending path
    pub fn from_io(err: io::Error, path: impl AsRef<std::path::Path>) -> Self {
        let path = path.as_ref().display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => WebdeskError::NotFound(path),
            io::ErrorKind::AlreadyExists => WebdeskError::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => {
                WebdeskError::Transport(format!("access denied: {}", path))
            }
            _ => WebdeskError::Io(err),
        }
    }
}

/// Result type alias for webdesk operations
pub type Result<T> = std::result::Result<T, WebdeskError>;
