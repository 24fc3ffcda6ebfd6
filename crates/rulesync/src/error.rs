use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulesyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid duration '{value}' for {name}: {reason}")]
    InvalidDuration {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Resync interval {name} must be greater than zero")]
    ZeroResync { name: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove directory '{path}': {source}")]
    RemoveDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while listing or watching object manifests.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to read manifest directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read manifest '{path}': {source}")]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in '{path}': {message}")]
    ParseManifest { path: PathBuf, message: String },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Event channel closed unexpectedly")]
    Closed,
}

pub type Result<T> = std::result::Result<T, RulesyncError>;
