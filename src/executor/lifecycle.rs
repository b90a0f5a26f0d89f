//! Node Lifecycle Executor
//!
//! Maps node commands onto the lifecycle of the managed containers:
//!
//! ```text
//! Absent  --start-->   Running
//! Running --stop-->    Stopped
//! Stopped --start-->   Running
//! Running|Stopped --restart--> Running
//! any     --clean-->   Absent
//! ```
//!
//! State is never remembered between commands. Every report is built from a
//! fresh runtime query taken after the action, and action errors are
//! reported next to the state that was actually observed.

use crate::executor::artifacts::{self, ALL_ARTIFACT_FILES, COMPOSE_FILE};
use crate::executor::error::ExecutorError;
use crate::executor::runtime::{CleanupStep, ContainerRuntime, ContainerStatus};
use crate::topology::model::Configuration;
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn, Logger};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const APP_CONTAINER: &str = "app";
pub const DATABASE_CONTAINER: &str = "database";

/// Containers declared by the generated compose file
pub const MANAGED_CONTAINERS: [&str; 2] = [APP_CONTAINER, DATABASE_CONTAINER];

/// Name of the persisted node configuration inside the working directory
pub const CONFIG_FILE: &str = "config.json";

/// Liveness of one managed container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub status: bool,
    pub state: ContainerStatus,
}

impl From<ContainerStatus> for ContainerReport {
    fn from(state: ContainerStatus) -> Self {
        Self {
            status: state.is_running(),
            state,
        }
    }
}

pub type ContainerStates = BTreeMap<String, ContainerReport>;

/// Result of acting on one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerAction {
    pub container: String,
    /// Observed after the action; `None` when the runtime could not be queried
    pub state: Option<ContainerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainerAction {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of acting on every managed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackAction {
    pub containers: Vec<ContainerAction>,
}

impl StackAction {
    pub fn succeeded(&self) -> bool {
        self.containers.iter().all(ContainerAction::succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureReport {
    pub status: String,
    pub language: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchReport {
    pub status: String,
}

/// Declared configuration next to the live container states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectReport {
    pub config: Option<Configuration>,
    pub docker: ContainerStates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub status: String,
    pub containers: ContainerStates,
    pub steps: Vec<CleanupStep>,
}

/// Executes node commands against the local container runtime.
///
/// Mutating commands are serialized through one lock; `check_alive` and
/// `inspect` never take it.
pub struct NodeExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    workdir: PathBuf,
    mutation: Mutex<()>,
    logger: Logger,
}

impl NodeExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, workdir: impl Into<PathBuf>, logger: Logger) -> Self {
        Self {
            runtime,
            workdir: workdir.into(),
            mutation: Mutex::new(()),
            logger,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Persist the configuration and render every deployment artifact.
    /// Never starts anything.
    pub async fn configure(&self, config: Configuration) -> Result<ConfigureReport, ExecutorError> {
        let _guard = self.mutation.lock().await;

        // Render first so an unsupported artifact leaves the node untouched
        let generated = artifacts::generate(&config.artifact)?;

        tokio::fs::create_dir_all(&self.workdir)
            .await
            .map_err(|source| ExecutorError::Write {
                path: self.workdir.clone(),
                source,
            })?;

        for artifact in &generated {
            self.write_file(artifact.file_name, artifact.contents.as_bytes())
                .await?;
        }

        // Drop files a previous configuration produced but this one does not
        for stale in ALL_ARTIFACT_FILES
            .iter()
            .filter(|name| !generated.iter().any(|g| g.file_name == **name))
        {
            let path = self.workdir.join(stale);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(self.logger, "Removed stale artifact"; "file" => *stale),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ExecutorError::Write { path, source }),
            }
        }

        // Written last so the declared configuration never runs ahead of its artifacts
        self.write_file(CONFIG_FILE, &serde_json::to_vec_pretty(&config)?)
            .await?;

        let mut files = vec![CONFIG_FILE.to_string()];
        files.extend(generated.iter().map(|g| g.file_name.to_string()));

        info!(self.logger, "Node configured";
            "language" => &config.artifact.application.language,
            "files" => files.len()
        );

        Ok(ConfigureReport {
            status: "configured".to_string(),
            language: config.artifact.application.language.clone(),
            files,
        })
    }

    /// Launch the whole declared stack. Returns once the launch is under way.
    pub async fn start_stack(&self) -> Result<LaunchReport, ExecutorError> {
        let _guard = self.mutation.lock().await;

        let compose = self.workdir.join(COMPOSE_FILE);
        if !tokio::fs::try_exists(&compose).await.unwrap_or(false) {
            return Err(ExecutorError::NotConfigured(compose));
        }

        self.runtime.launch_stack(&self.workdir).await?;
        info!(self.logger, "Stack launch requested"; "workdir" => %self.workdir.display());

        Ok(LaunchReport {
            status: "launched".to_string(),
        })
    }

    pub async fn start(&self, name: &str) -> ContainerAction {
        let _guard = self.mutation.lock().await;
        self.start_locked(name).await
    }

    pub async fn stop(&self, name: &str) -> ContainerAction {
        let _guard = self.mutation.lock().await;
        self.stop_locked(name).await
    }

    pub async fn restart(&self, name: &str) -> ContainerAction {
        let _guard = self.mutation.lock().await;
        self.restart_locked(name).await
    }

    /// Stop every managed container, app first
    pub async fn stop_stack(&self) -> StackAction {
        let _guard = self.mutation.lock().await;
        let mut containers = Vec::new();
        for name in MANAGED_CONTAINERS {
            containers.push(self.stop_locked(name).await);
        }
        StackAction { containers }
    }

    /// Stop the app then the database, start the database then the app
    pub async fn restart_stack(&self) -> StackAction {
        let _guard = self.mutation.lock().await;

        let mut stop_errors = BTreeMap::new();
        for name in MANAGED_CONTAINERS {
            if self.observe(name).await == Ok(ContainerStatus::Running) {
                if let Err(e) = self.runtime.stop(name).await {
                    stop_errors.insert(name, e.to_string());
                }
            }
        }

        let mut containers = Vec::new();
        for name in MANAGED_CONTAINERS.iter().rev() {
            let action = match stop_errors.remove(name) {
                Some(error) => self.report(name, Some(error)).await,
                None => self.start_locked(name).await,
            };
            containers.push(action);
        }
        containers.reverse();

        StackAction { containers }
    }

    /// Observed running state of each managed container, from one runtime query
    pub async fn check_alive(&self) -> Result<ContainerStates, ExecutorError> {
        let snapshot = self.runtime.snapshot().await?;
        Ok(managed_states(&snapshot))
    }

    /// Persisted configuration (if any) and the live container states
    pub async fn inspect(&self) -> Result<InspectReport, ExecutorError> {
        let path = self.workdir.join(CONFIG_FILE);
        let config = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(ExecutorError::Read { path, source }),
        };

        let snapshot = self.runtime.snapshot().await?;
        Ok(InspectReport {
            config,
            docker: managed_states(&snapshot),
        })
    }

    /// Drive every managed container to absent, then reclaim images and
    /// volumes. Sub-step failures are logged and reported, never raised.
    pub async fn clean(&self) -> CleanReport {
        let _guard = self.mutation.lock().await;
        let mut steps = Vec::new();

        for name in MANAGED_CONTAINERS {
            match self.runtime.status(name).await {
                Ok(ContainerStatus::Absent) => {}
                Ok(status) => {
                    if status.is_running() {
                        steps.push(CleanupStep::from_result(
                            format!("stop {}", name),
                            self.runtime.stop(name).await,
                        ));
                    }
                    steps.push(CleanupStep::from_result(
                        format!("remove {}", name),
                        self.runtime.remove(name).await,
                    ));
                }
                Err(e) => steps.push(CleanupStep::from_result(format!("inspect {}", name), Err(e))),
            }
        }

        steps.extend(self.runtime.prune_all().await);

        let containers = match self.runtime.snapshot().await {
            Ok(snapshot) => managed_states(&snapshot),
            Err(e) => {
                steps.push(CleanupStep::from_result("verify containers", Err(e)));
                ContainerStates::new()
            }
        };

        for step in steps.iter().filter(|s| !s.ok) {
            warn!(self.logger, "Cleanup step failed";
                "step" => &step.step,
                "error" => step.error.as_deref().unwrap_or("")
            );
        }
        info!(self.logger, "Node cleaned";
            "steps" => steps.len(),
            "failed" => steps.iter().filter(|s| !s.ok).count()
        );

        CleanReport {
            status: "cleaned".to_string(),
            containers,
            steps,
        }
    }

    async fn start_locked(&self, name: &str) -> ContainerAction {
        let result = self.runtime.start(name).await;
        if let Err(e) = &result {
            warn!(self.logger, "Container start failed"; "container" => name, "error" => %e);
        }
        self.report(name, result.err().map(|e| e.to_string())).await
    }

    async fn stop_locked(&self, name: &str) -> ContainerAction {
        let result = self.runtime.stop(name).await;
        if let Err(e) = &result {
            warn!(self.logger, "Container stop failed"; "container" => name, "error" => %e);
        }
        self.report(name, result.err().map(|e| e.to_string())).await
    }

    /// Stop-then-start; an already stopped container is simply started
    async fn restart_locked(&self, name: &str) -> ContainerAction {
        if self.observe(name).await == Ok(ContainerStatus::Running) {
            if let Err(e) = self.runtime.stop(name).await {
                warn!(self.logger, "Container stop failed during restart"; "container" => name, "error" => %e);
                return self.report(name, Some(e.to_string())).await;
            }
        }
        self.start_locked(name).await
    }

    async fn observe(&self, name: &str) -> Result<ContainerStatus, String> {
        self.runtime.status(name).await.map_err(|e| e.to_string())
    }

    /// Re-query the container and pair the observed state with `error`
    async fn report(&self, name: &str, error: Option<String>) -> ContainerAction {
        let (state, error) = match self.observe(name).await {
            Ok(state) => (Some(state), error),
            Err(query_error) => {
                let query_error = format!("status query failed: {}", query_error);
                let combined = match error {
                    Some(e) => format!("{}; {}", e, query_error),
                    None => query_error,
                };
                (None, Some(combined))
            }
        };

        debug!(self.logger, "Container observed";
            "container" => name,
            "state" => state.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string())
        );

        ContainerAction {
            container: name.to_string(),
            state,
            error,
        }
    }

    async fn write_file(&self, name: &str, contents: &[u8]) -> Result<(), ExecutorError> {
        let path = self.workdir.join(name);
        crate::fs::write_atomic(&path, contents)
            .await
            .map_err(|source| ExecutorError::Write { path, source })
    }
}

fn managed_states(snapshot: &BTreeMap<String, ContainerStatus>) -> ContainerStates {
    MANAGED_CONTAINERS
        .iter()
        .map(|name| {
            let state = snapshot.get(*name).copied().unwrap_or(ContainerStatus::Absent);
            (name.to_string(), ContainerReport::from(state))
        })
        .collect()
}
