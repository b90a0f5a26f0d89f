//! Process settings for the dispatcher and agent roles

use crate::dispatch::DispatchSettings;
use crate::http::auth::StaticTokens;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every protected route would answer 403
    #[error("no API tokens configured, pass --token or --token-file")]
    NoTokens,
}

/// Configuration for the client-facing dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Address to serve HTTP on (e.g. "0.0.0.0:7000")
    pub listen_address: SocketAddr,

    /// Path of the persisted fleet configuration
    pub topology_path: PathBuf,

    /// Tokens given directly
    pub tokens: Vec<String>,

    /// File with one token per line
    pub token_file: Option<PathBuf>,

    pub settings: DispatchSettings,
}

impl DispatcherConfig {
    pub fn new(listen_address: SocketAddr, topology_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_address,
            topology_path: topology_path.into(),
            tokens: Vec::new(),
            token_file: None,
            settings: DispatchSettings::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn with_tokens(mut self, tokens: impl IntoIterator<Item = String>) -> Self {
        self.tokens.extend(tokens);
        self
    }

    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Agent port for servers without a control port
    pub fn with_node_port(mut self, port: u16) -> Self {
        self.settings.node_port = port;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.settings.node_timeout = timeout;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.settings.max_parallel = max_parallel;
        self
    }

    /// Collect the tokens from flags and the token file
    pub async fn load_tokens(&self) -> Result<StaticTokens, ConfigError> {
        let mut tokens = StaticTokens::new(self.tokens.iter().cloned());

        if let Some(path) = &self.token_file {
            let from_file = StaticTokens::from_file(path)
                .await
                .map_err(|source| ConfigError::TokenFile {
                    path: path.clone(),
                    source,
                })?;
            tokens.extend(from_file);
        }

        if tokens.is_empty() {
            return Err(ConfigError::NoTokens);
        }
        Ok(tokens)
    }
}

/// Container runtime backing an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Shell out to a docker-compatible binary
    Docker { binary: String },
    /// Keep containers in memory, for hosts without a container engine
    Memory,
}

/// Configuration for a node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address to serve HTTP on (e.g. "0.0.0.0:8080")
    pub listen_address: SocketAddr,

    /// Directory holding config.json and the generated deployment files
    pub workdir: PathBuf,

    pub runtime: RuntimeKind,
}

impl AgentConfig {
    pub fn new(listen_address: SocketAddr, workdir: impl Into<PathBuf>) -> Self {
        Self {
            listen_address,
            workdir: workdir.into(),
            runtime: RuntimeKind::Docker {
                binary: "docker".to_string(),
            },
        }
    }

    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::auth::TokenValidator;

    fn listen() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_tokens_from_flags_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tokens");
        std::fs::write(&file, "# ops\nfile-token\n").unwrap();

        let config = DispatcherConfig::new(listen(), "config.json")
            .with_token("flag-token")
            .with_token_file(&file);
        let tokens = config.load_tokens().await.unwrap();

        assert!(tokens.is_valid("flag-token"));
        assert!(tokens.is_valid("file-token"));
    }

    #[tokio::test]
    async fn test_no_tokens_is_refused() {
        let config = DispatcherConfig::new(listen(), "config.json");
        assert!(matches!(config.load_tokens().await, Err(ConfigError::NoTokens)));

        let config = config.with_token_file("/nonexistent/tokens");
        assert!(matches!(
            config.load_tokens().await,
            Err(ConfigError::TokenFile { .. })
        ));
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = DispatcherConfig::new(listen(), "config.json")
            .with_node_port(9100)
            .with_node_timeout(Duration::from_secs(5))
            .with_max_parallel(4);
        assert_eq!(config.settings.node_port, 9100);
        assert_eq!(config.settings.node_timeout, Duration::from_secs(5));
        assert_eq!(config.settings.max_parallel, 4);

        let agent = AgentConfig::new(listen(), "/srv/fleetdeck");
        assert_eq!(
            agent.runtime,
            RuntimeKind::Docker {
                binary: "docker".into()
            }
        );
    }
}
