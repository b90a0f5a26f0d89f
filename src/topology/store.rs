//! Topology Store
//!
//! Holds the fleet configuration for the life of the process. The document
//! is read once at startup; if it does not exist yet, the first caller that
//! supplies one gets it validated and written to disk, after which the store
//! is frozen.

use crate::topology::address::Address;
use crate::topology::error::TopologyError;
use crate::topology::model::{Configuration, Server};
use slog::{debug, info, Logger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Servers selected in one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCluster {
    pub name: String,
    pub servers: Vec<Server>,
}

/// Result of resolving an [`Address`], in configuration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub clusters: Vec<ResolvedCluster>,
}

impl Resolution {
    /// Resolve an address against a configuration.
    ///
    /// An unknown cluster yields no clusters at all; an unknown server in a
    /// known cluster yields that cluster with no servers. Neither is an error.
    pub fn of(config: &Configuration, address: &Address) -> Self {
        let Some(cluster_name) = address.cluster_name() else {
            return Self {
                clusters: config
                    .clusters
                    .iter()
                    .map(|c| ResolvedCluster {
                        name: c.name.clone(),
                        servers: c.servers.clone(),
                    })
                    .collect(),
            };
        };

        let Some(cluster) = config.cluster(cluster_name) else {
            return Self::default();
        };

        let servers = match address.server_name() {
            None => cluster.servers.clone(),
            Some(server_name) => cluster.server(server_name).cloned().into_iter().collect(),
        };

        Self {
            clusters: vec![ResolvedCluster {
                name: cluster.name.clone(),
                servers,
            }],
        }
    }

    /// Number of (cluster, server) pairs selected
    pub fn target_count(&self) -> usize {
        self.clusters.iter().map(|c| c.servers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.target_count() == 0
    }
}

/// Read-only, write-once holder of the fleet [`Configuration`]
pub struct TopologyStore {
    path: PathBuf,
    config: OnceCell<Arc<Configuration>>,
    logger: Logger,
}

impl TopologyStore {
    /// Open the store backed by `path`.
    ///
    /// A missing file is not an error: the store stays unset until
    /// [`TopologyStore::get_or_persist`] is given a configuration.
    pub async fn open(path: impl Into<PathBuf>, logger: Logger) -> Result<Self, TopologyError> {
        let path = path.into();
        let config = OnceCell::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let parsed: Configuration = serde_json::from_slice(&bytes)?;
                parsed.validate()?;
                info!(logger, "Loaded fleet configuration";
                    "path" => %path.display(),
                    "clusters" => parsed.clusters.len(),
                    "servers" => parsed.server_count()
                );
                let _ = config.set(Arc::new(parsed));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(logger, "No fleet configuration on disk yet"; "path" => %path.display());
            }
            Err(source) => return Err(TopologyError::Read { path, source }),
        }

        Ok(Self {
            path,
            config,
            logger,
        })
    }

    /// Build a store around an already loaded configuration. Nothing is
    /// written to `path`.
    pub fn with_configuration(
        path: impl Into<PathBuf>,
        config: Configuration,
        logger: Logger,
    ) -> Result<Self, TopologyError> {
        config.validate()?;
        Ok(Self {
            path: path.into(),
            config: OnceCell::new_with(Some(Arc::new(config))),
            logger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configuration, if one has been loaded or persisted
    pub fn current(&self) -> Option<Arc<Configuration>> {
        self.config.get().cloned()
    }

    /// Return the stored configuration, persisting `supplied` if the store
    /// is still unset. Once set, supplied values are ignored.
    pub async fn get_or_persist(
        &self,
        supplied: Option<Configuration>,
    ) -> Result<Arc<Configuration>, TopologyError> {
        if let Some(config) = self.config.get() {
            if supplied.is_some() {
                debug!(self.logger, "Configuration already frozen, ignoring supplied value");
            }
            return Ok(config.clone());
        }

        self.config
            .get_or_try_init(|| async {
                let config = supplied.ok_or_else(|| TopologyError::Missing {
                    path: self.path.clone(),
                })?;
                config.validate()?;
                self.persist(&config).await?;
                Ok(Arc::new(config))
            })
            .await
            .cloned()
    }

    async fn persist(&self, config: &Configuration) -> Result<(), TopologyError> {
        let json = serde_json::to_vec_pretty(config)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TopologyError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }

        crate::fs::write_atomic(&self.path, &json)
            .await
            .map_err(|source| TopologyError::Write {
                path: self.path.clone(),
                source,
            })?;

        info!(self.logger, "Persisted fleet configuration";
            "path" => %self.path.display(),
            "clusters" => config.clusters.len(),
            "servers" => config.server_count()
        );
        Ok(())
    }
}
