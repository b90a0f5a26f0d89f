use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, persisting or validating the fleet topology
#[derive(Debug, Error)]
pub enum TopologyError {
    /// No configuration on disk and none supplied by the caller
    #[error("configuration missing: {path} does not exist and no configuration was supplied")]
    Missing { path: PathBuf },

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate cluster name '{0}'")]
    DuplicateCluster(String),

    #[error("duplicate server name '{server}' in cluster '{cluster}'")]
    DuplicateServer { cluster: String, server: String },

    #[error("unsupported application language '{0}' (expected one of: java, python)")]
    UnsupportedLanguage(String),
}
