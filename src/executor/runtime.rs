//! Container runtime capability
//!
//! The executor drives containers only through [`ContainerRuntime`], so the
//! lifecycle logic is the same whether a docker CLI or an in-memory fake is
//! behind it.

use crate::executor::error::RuntimeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Observed state of a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Absent,
    Stopped,
    Running,
}

impl ContainerStatus {
    pub fn is_running(self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Absent => write!(f, "absent"),
            ContainerStatus::Stopped => write!(f, "stopped"),
            ContainerStatus::Running => write!(f, "running"),
        }
    }
}

/// Outcome of one reclamation sub-step of a prune
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStep {
    pub step: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupStep {
    pub fn from_result(step: impl Into<String>, result: Result<(), RuntimeError>) -> Self {
        match result {
            Ok(()) => Self {
                step: step.into(),
                ok: true,
                error: None,
            },
            Err(e) => Self {
                step: step.into(),
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Current state of one container
    async fn status(&self, name: &str) -> Result<ContainerStatus, RuntimeError>;

    /// State of every container the runtime knows about, taken in a single
    /// query. Names not present are absent.
    async fn snapshot(&self) -> Result<BTreeMap<String, ContainerStatus>, RuntimeError>;

    async fn start(&self, name: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    /// Remove the container, forcing it down first if needed
    async fn remove(&self, name: &str) -> Result<(), RuntimeError>;

    /// Launch the full declared stack from the artifacts in `workdir`.
    /// Returns once the launch is under way, not when the stack is healthy.
    async fn launch_stack(&self, workdir: &Path) -> Result<(), RuntimeError>;

    /// Reclaim every container, volume and image. Best-effort: each
    /// sub-step is reported and a failure does not stop the others.
    async fn prune_all(&self) -> Vec<CleanupStep>;
}
