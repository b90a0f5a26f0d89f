//! Fan-Out Dispatcher
//!
//! Resolves an address against the topology, calls every selected node
//! concurrently (bounded by a semaphore, each call under its own timeout)
//! and waits for all of them before aggregating. A failing node only ever
//! produces a failure entry for itself.

use crate::dispatch::client::{NodeCall, NodeClient, NodeEndpoint};
use crate::dispatch::command::Command;
use crate::dispatch::error::{DispatchError, NodeCallError};
use crate::dispatch::result::{AggregatedResult, ClusterResults, NodeOutcome, NodeResult};
use crate::topology::{Address, Configuration, Resolution, TopologyStore};
use slog::{info, o, warn, Logger};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_NODE_PORT: u16 = 8080;
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_PARALLEL: usize = 16;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Agent port for servers that declare no control port
    pub node_port: u16,
    /// Budget for each node call
    pub node_timeout: Duration,
    /// Node calls in flight at once
    pub max_parallel: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            node_port: DEFAULT_NODE_PORT,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

pub struct Dispatcher {
    store: Arc<TopologyStore>,
    client: Arc<dyn NodeClient>,
    settings: DispatchSettings,
    logger: Logger,
}

impl Dispatcher {
    pub fn new(
        store: Arc<TopologyStore>,
        client: Arc<dyn NodeClient>,
        settings: DispatchSettings,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            client,
            settings,
            logger,
        }
    }

    pub fn store(&self) -> &TopologyStore {
        &self.store
    }

    /// Run `command` on every node `address` selects.
    ///
    /// `supplied` is only consulted by `configure`, and only while the store
    /// is still unset. Errors are returned only when the topology itself is
    /// unavailable or the request is malformed; node failures end up in the
    /// result.
    pub async fn dispatch(
        &self,
        command: Command,
        address: &Address,
        supplied: Option<Configuration>,
    ) -> Result<AggregatedResult, DispatchError> {
        if address.container_name().is_some() && !command.accepts_container() {
            return Err(DispatchError::ContainerNotAccepted(command));
        }

        let config = match command {
            Command::Configure => self.store.get_or_persist(supplied).await?,
            _ => self.store.get_or_persist(None).await?,
        };
        let resolution = Resolution::of(&config, address);

        let mut call = NodeCall::new(command);
        if let Some(container) = address.container_name() {
            call = call.with_container(container);
        }
        if command.carries_body() {
            call = call.with_body(config.clone());
        }

        let dispatch_id = uuid::Uuid::new_v4();
        let logger = self.logger.new(o!(
            "dispatch_id" => dispatch_id.to_string(),
            "command" => command.as_str()
        ));

        info!(logger, "Dispatching";
            "address" => %address,
            "targets" => resolution.target_count()
        );
        if resolution.is_empty() {
            info!(logger, "Address matches no nodes"; "address" => %address);
        }

        let result = self.fan_out(&resolution, Arc::new(call), &logger).await;

        info!(logger, "Dispatch complete";
            "targets" => result.leaf_count(),
            "failed" => result.failure_count()
        );

        Ok(result)
    }

    async fn fan_out(&self, resolution: &Resolution, call: Arc<NodeCall>, logger: &Logger) -> AggregatedResult {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel.max(1)));
        let mut tasks = JoinSet::new();

        // One slot per target, filled as tasks finish
        let mut slots: Vec<Vec<Option<NodeResult>>> = resolution
            .clusters
            .iter()
            .map(|c| vec![None; c.servers.len()])
            .collect();

        for (ci, cluster) in resolution.clusters.iter().enumerate() {
            for (si, server) in cluster.servers.iter().enumerate() {
                let endpoint = NodeEndpoint::for_server(server, self.settings.node_port);
                let server_name = server.name.clone();
                let client = self.client.clone();
                let call = call.clone();
                let semaphore = semaphore.clone();
                let timeout = self.settings.node_timeout;
                let logger = logger.new(o!(
                    "cluster" => cluster.name.clone(),
                    "server" => server.name.clone(),
                    "endpoint" => endpoint.to_string()
                ));

                tasks.spawn(async move {
                    // Held until the call finishes
                    let _permit = semaphore.acquire_owned().await;
                    let started = Instant::now();

                    let outcome = match tokio::time::timeout(timeout, client.call(&endpoint, &call)).await {
                        Ok(result) => NodeOutcome::from(result),
                        Err(_) => NodeOutcome::from(Err(NodeCallError::Timeout)),
                    };
                    let latency = started.elapsed();

                    match &outcome {
                        NodeOutcome::Success(_) => {
                            info!(logger, "Node call succeeded"; "latency_ms" => latency.as_millis() as u64)
                        }
                        NodeOutcome::Failure(reason) => {
                            warn!(logger, "Node call failed";
                                "reason" => reason,
                                "latency_ms" => latency.as_millis() as u64
                            )
                        }
                    }

                    (
                        ci,
                        si,
                        NodeResult {
                            server_name,
                            outcome,
                            latency,
                        },
                    )
                });
            }
        }

        let mut join_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ci, si, result)) => slots[ci][si] = Some(result),
                Err(e) => {
                    warn!(logger, "Dispatch task failed"; "error" => %e);
                    join_error = Some(e.to_string());
                }
            }
        }

        let clusters = resolution
            .clusters
            .iter()
            .zip(slots)
            .map(|(cluster, slots)| ClusterResults {
                cluster_name: cluster.name.clone(),
                servers: cluster
                    .servers
                    .iter()
                    .zip(slots)
                    .map(|(server, slot)| {
                        slot.unwrap_or_else(|| NodeResult {
                            server_name: server.name.clone(),
                            outcome: NodeOutcome::Failure(format!(
                                "dispatch task failed: {}",
                                join_error.as_deref().unwrap_or("task did not complete")
                            )),
                            latency: Duration::ZERO,
                        })
                    })
                    .collect(),
            })
            .collect();

        AggregatedResult { clusters }
    }
}
