//! In-memory container runtime
//!
//! Keeps container states in a map. Used by the test suites and for running
//! an agent on machines without a container engine. Failures can be injected
//! per operation and container name.

use crate::executor::error::RuntimeError;
use crate::executor::runtime::{CleanupStep, ContainerRuntime, ContainerStatus};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Start,
    Stop,
    Remove,
    Launch,
}

#[derive(Default)]
struct Inner {
    containers: BTreeMap<String, ContainerStatus>,
    failures: HashSet<(RuntimeOp, String)>,
    failing_prune_steps: HashSet<String>,
    launches: Vec<PathBuf>,
    /// Containers `launch_stack` brings up
    stack: Vec<String>,
}

/// Map-backed [`ContainerRuntime`]
#[derive(Clone, Default)]
pub struct InMemoryRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRuntime {
    /// A runtime whose stack launch creates and starts `stack`
    pub fn with_stack(stack: &[&str]) -> Self {
        let runtime = Self::default();
        runtime.lock().stack = stack.iter().map(|s| s.to_string()).collect();
        runtime
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-update
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or overwrite) a container in the given state
    pub fn set_container(&self, name: &str, status: ContainerStatus) {
        self.lock().containers.insert(name.to_string(), status);
    }

    /// Make `op` on `name` fail until cleared
    pub fn fail(&self, op: RuntimeOp, name: &str) {
        self.lock().failures.insert((op, name.to_string()));
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failures.clear();
        inner.failing_prune_steps.clear();
    }

    /// Make the named prune sub-step fail
    pub fn fail_prune_step(&self, step: &str) {
        self.lock().failing_prune_steps.insert(step.to_string());
    }

    /// Working directories passed to `launch_stack`, in call order
    pub fn launches(&self) -> Vec<PathBuf> {
        self.lock().launches.clone()
    }

    fn check(inner: &Inner, op: RuntimeOp, name: &str) -> Result<(), RuntimeError> {
        if inner.failures.contains(&(op, name.to_string())) {
            return Err(RuntimeError::Failed {
                command: format!("{:?} {}", op, name).to_lowercase(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn status(&self, name: &str) -> Result<ContainerStatus, RuntimeError> {
        Ok(self
            .lock()
            .containers
            .get(name)
            .copied()
            .unwrap_or(ContainerStatus::Absent))
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, ContainerStatus>, RuntimeError> {
        Ok(self.lock().containers.clone())
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        Self::check(&inner, RuntimeOp::Start, name)?;
        match inner.containers.get_mut(name) {
            Some(status) => {
                *status = ContainerStatus::Running;
                Ok(())
            }
            None => Err(RuntimeError::NoSuchContainer(name.to_string())),
        }
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        Self::check(&inner, RuntimeOp::Stop, name)?;
        match inner.containers.get_mut(name) {
            Some(status) => {
                *status = ContainerStatus::Stopped;
                Ok(())
            }
            None => Err(RuntimeError::NoSuchContainer(name.to_string())),
        }
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        Self::check(&inner, RuntimeOp::Remove, name)?;
        match inner.containers.remove(name) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::NoSuchContainer(name.to_string())),
        }
    }

    async fn launch_stack(&self, workdir: &Path) -> Result<(), RuntimeError> {
        let mut inner = self.lock();
        Self::check(&inner, RuntimeOp::Launch, "stack")?;
        inner.launches.push(workdir.to_path_buf());
        let stack = inner.stack.clone();
        for name in stack {
            inner.containers.insert(name, ContainerStatus::Running);
        }
        Ok(())
    }

    async fn prune_all(&self) -> Vec<CleanupStep> {
        let mut inner = self.lock();
        let mut steps = Vec::new();

        for step in ["remove containers", "remove volumes", "remove images", "system prune"] {
            let result = if inner.failing_prune_steps.contains(step) {
                Err(RuntimeError::Failed {
                    command: step.to_string(),
                    stderr: "injected failure".to_string(),
                })
            } else {
                if step == "remove containers" {
                    inner.containers.clear();
                }
                Ok(())
            };
            steps.push(CleanupStep::from_result(step, result));
        }

        steps
    }
}
