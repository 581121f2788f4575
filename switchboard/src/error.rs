//! Error types shared across the engine.
//!
//! Handler, suggestion and rule callbacks return `anyhow::Result` since they
//! are authored outside the engine; everything the engine itself produces is
//! one of the typed errors below.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the remote command catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog scope not found: {0}")]
    ScopeNotFound(String),

    #[error("Catalog transport error: {0}")]
    Transport(String),

    #[error("Catalog returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode catalog response: {0}")]
    Decode(String),
}

/// Failures reading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Generic(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
