use std::path::PathBuf;
use thiserror::Error;

/// Errors from the container runtime
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be executed at all
    #[error("failed to run `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// The runtime ran and reported a failure
    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("no such container: {0}")]
    NoSuchContainer(String),

    #[error("unexpected runtime output: {0}")]
    UnexpectedOutput(String),
}

/// Errors while rendering deployment artifacts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("unsupported application language '{0}' (expected one of: java, python)")]
    UnsupportedLanguage(String),

    #[error("unsupported builder '{0}' (expected one of: maven, gradle)")]
    UnsupportedBuilder(String),
}

/// Errors surfaced by node executor commands
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed node configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("node is not configured: {0} is missing, run configure first")]
    NotConfigured(PathBuf),
}
