//! Docker CLI runtime
//!
//! Drives the local docker engine by running the `docker` binary. Every
//! invocation passes its arguments as a vector; nothing goes through a
//! shell, so container, volume and image ids are listed first and then
//! removed one by one.

use crate::executor::error::RuntimeError;
use crate::executor::runtime::{CleanupStep, ContainerRuntime, ContainerStatus};
use async_trait::async_trait;
use slog::{debug, info, warn, Logger};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub struct DockerCli {
    binary: String,
    logger: Logger,
}

impl DockerCli {
    pub fn new(logger: Logger) -> Self {
        Self {
            binary: "docker".to_string(),
            logger,
        }
    }

    /// Use a different docker-compatible binary (e.g. `podman`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Run the binary to completion and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let command = self.describe(args);
        debug!(self.logger, "Running container runtime command"; "command" => &command);

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(RuntimeError::Failed { command, stderr })
        }
    }

    async fn list_ids(&self, args: &[&str]) -> Result<Vec<String>, RuntimeError> {
        let stdout = self.run(args).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// List ids with `list_args`, then run `remove_args <id>` for each one.
    /// Keeps going past individual failures and reports them together.
    async fn remove_each(&self, list_args: &[&str], remove_args: &[&str]) -> Result<(), RuntimeError> {
        let ids = self.list_ids(list_args).await?;
        let mut failures = Vec::new();

        for id in &ids {
            let mut args: Vec<&str> = remove_args.to_vec();
            args.push(id.as_str());
            if let Err(e) = self.run(&args).await {
                warn!(self.logger, "Failed to remove runtime object"; "id" => id, "error" => %e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::Failed {
                command: self.describe(remove_args),
                stderr: failures.join("; "),
            })
        }
    }
}

fn parse_state(state: &str) -> Result<ContainerStatus, RuntimeError> {
    match state {
        "running" | "restarting" => Ok(ContainerStatus::Running),
        "created" | "exited" | "paused" | "dead" | "removing" => Ok(ContainerStatus::Stopped),
        other => Err(RuntimeError::UnexpectedOutput(format!(
            "unknown container state '{}'",
            other
        ))),
    }
}

fn is_missing(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn status(&self, name: &str) -> Result<ContainerStatus, RuntimeError> {
        match self
            .run(&["container", "inspect", "--format", "{{.State.Status}}", name])
            .await
        {
            Ok(stdout) => parse_state(stdout.trim()),
            Err(RuntimeError::Failed { stderr, .. }) if is_missing(&stderr) => {
                Ok(ContainerStatus::Absent)
            }
            Err(e) => Err(e),
        }
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, ContainerStatus>, RuntimeError> {
        let stdout = self
            .run(&["container", "ls", "--all", "--format", "{{.Names}}\t{{.State}}"])
            .await?;

        let mut states = BTreeMap::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let (names, state) = line
                .split_once('\t')
                .ok_or_else(|| RuntimeError::UnexpectedOutput(line.to_string()))?;
            let status = parse_state(state.trim())?;
            // A container can carry several comma-separated names
            for name in names.split(',') {
                states.insert(name.trim().to_string(), status);
            }
        }
        Ok(states)
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["container", "start", name]).await.map(|_| ())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["container", "stop", name]).await.map(|_| ())
    }

    async fn remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(&["container", "rm", "--force", name]).await.map(|_| ())
    }

    async fn launch_stack(&self, workdir: &Path) -> Result<(), RuntimeError> {
        let args = ["compose", "up", "--build", "--detach"];
        let command = self.describe(&args);

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        info!(self.logger, "Stack launch started";
            "command" => &command,
            "workdir" => %workdir.display()
        );

        // Reap the child in the background; the caller only waits for the launch
        let logger = self.logger.clone();
        tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) if output.status.success() => {
                    info!(logger, "Stack launch finished"; "command" => &command);
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    warn!(logger, "Stack launch failed";
                        "command" => &command,
                        "status" => %output.status,
                        "stderr" => stderr
                    );
                }
                Err(e) => {
                    warn!(logger, "Lost track of stack launch"; "command" => &command, "error" => %e);
                }
            }
        });

        Ok(())
    }

    async fn prune_all(&self) -> Vec<CleanupStep> {
        vec![
            CleanupStep::from_result(
                "remove containers",
                self.remove_each(&["container", "ls", "--all", "--quiet"], &["container", "rm", "--force"])
                    .await,
            ),
            CleanupStep::from_result(
                "remove volumes",
                self.remove_each(&["volume", "ls", "--quiet"], &["volume", "rm", "--force"])
                    .await,
            ),
            CleanupStep::from_result(
                "remove images",
                self.remove_each(&["image", "ls", "--all", "--quiet"], &["image", "rm", "--force"])
                    .await,
            ),
            CleanupStep::from_result(
                "system prune",
                self.run(&["system", "prune", "--all", "--force"]).await.map(|_| ()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::o;

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("running").unwrap(), ContainerStatus::Running);
        assert_eq!(parse_state("exited").unwrap(), ContainerStatus::Stopped);
        assert_eq!(parse_state("created").unwrap(), ContainerStatus::Stopped);
        assert!(parse_state("bogus").is_err());
    }

    #[test]
    fn test_missing_container_detection() {
        assert!(is_missing("Error response from daemon: No such container: app"));
        assert!(is_missing("Error: No such object: app"));
        assert!(!is_missing("permission denied"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runtime = DockerCli::new(slog::Logger::root(slog::Discard, o!()))
            .with_binary("/nonexistent/docker-binary");

        assert!(matches!(
            runtime.start("app").await,
            Err(RuntimeError::Spawn { .. })
        ));

        // Prune never aborts, every step is reported
        let steps = runtime.prune_all().await;
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|s| !s.ok && s.error.is_some()));
    }
}
