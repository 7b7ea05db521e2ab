use std::path::PathBuf;

use thiserror::Error;

use crate::heart_rate::transport::TransportError;

/// Represents all possible errors that can occur during the app's lifecycle
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to create directory \"{path}\": {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to create file \"{path}\": {source}")]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error parsing config: {0}")]
    Config(#[from] config::ConfigError),
    #[error("TOML Serialization Error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("Failed to start HTTP server on {addr}: {reason}")]
    HttpBind { addr: String, reason: String },
    #[error("Logging setup failed: {0}")]
    Logging(String),
    // My errors
    #[error("Failed to get working directory")]
    WorkDir,
    #[error("No saved device to connect to, run once with the TUI first")]
    NoSavedDevice,
}
