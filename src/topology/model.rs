//! Fleet topology and deployment description
//!
//! These records mirror the JSON document persisted as `config.json` on the
//! control node and on every server. Field names on the wire are kebab-case.

use crate::executor::artifacts::Language;
use crate::topology::error::TopologyError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The whole fleet: identity provider, clusters and the artifact to deploy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(default)]
    pub identity_provider: IdentityProvider,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub artifact: Artifact,
}

/// Control-plane credentials. Only used to reach the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentityProvider {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub server_username: String,
    #[serde(default)]
    pub server_password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Server {
    pub name: String,
    /// Host name or IP address of the machine
    pub ip: String,
    /// SSH port
    #[serde(default)]
    pub port: u16,
    /// SSH user
    #[serde(default)]
    pub user: String,
    /// SSH password
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub deploy_details: DeployDetails,
    /// Port of the node agent. Falls back to the dispatcher's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployDetails {
    #[serde(default)]
    pub folder: String,
}

/// Declarative description of what to deploy on each server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Artifact {
    #[serde(default)]
    pub application: Application,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub extra_commands: ExtraCommands,
    #[serde(default)]
    pub code_checkout: CodeCheckout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Application {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub artifact: BuildOutput,
    #[serde(default)]
    pub docker_image: String,
    #[serde(default)]
    pub ports: PortMapping,
    #[serde(default)]
    pub builder: Builder,
}

/// Path of the built artifact inside the builder image (e.g. a jar)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortMapping {
    #[serde(default)]
    pub internal_docker: u16,
    #[serde(default)]
    pub external_docker: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Builder {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub docker_image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub name: String,
    /// Image used for the database container (e.g. `mysql:8`)
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub root_password: String,
    #[serde(default)]
    pub ports: PortMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtraCommands {
    #[serde(default)]
    pub local_script_folder_dir: String,
    #[serde(default)]
    pub commands: CommandLists,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandLists {
    #[serde(default)]
    pub before: Vec<BeforeCommand>,
    #[serde(default)]
    pub after: Vec<AfterCommand>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeforeCommand {
    pub command: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AfterCommand {
    pub command: String,
    #[serde(default)]
    pub run_order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeCheckout {
    #[serde(default)]
    pub git: GitCheckout,
    #[serde(default)]
    pub scp: ScpCheckout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitCheckout {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub repo_user: String,
    #[serde(default)]
    pub repo_password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScpCheckout {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub configurations: ScpSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScpSource {
    #[serde(default)]
    pub folder: String,
}

impl Configuration {
    /// Check the structural invariants of a topology.
    ///
    /// Cluster names must be unique, server names must be unique within
    /// their cluster, and a non-empty application language must be one of
    /// the supported runtimes.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut cluster_names = HashSet::new();
        for cluster in &self.clusters {
            if !cluster_names.insert(cluster.name.as_str()) {
                return Err(TopologyError::DuplicateCluster(cluster.name.clone()));
            }

            let mut server_names = HashSet::new();
            for server in &cluster.servers {
                if !server_names.insert(server.name.as_str()) {
                    return Err(TopologyError::DuplicateServer {
                        cluster: cluster.name.clone(),
                        server: server.name.clone(),
                    });
                }
            }
        }

        let language = &self.artifact.application.language;
        if !language.is_empty() {
            language
                .parse::<Language>()
                .map_err(|_| TopologyError::UnsupportedLanguage(language.clone()))?;
        }

        Ok(())
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Total number of servers across all clusters
    pub fn server_count(&self) -> usize {
        self.clusters.iter().map(|c| c.servers.len()).sum()
    }
}

impl Cluster {
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.name == name)
    }
}
