//! Process wiring for the two roles.
//!
//! [`DispatcherRuntime`] and [`AgentRuntime`] build every component from a
//! config, bind the listener and serve on a background task. Both are used
//! by the binary and by the end-to-end tests.

use crate::config::{AgentConfig, DispatcherConfig, RuntimeKind};
use crate::dispatch::{Dispatcher, HttpNodeClient};
use crate::executor::{ContainerRuntime, DockerCli, InMemoryRuntime, NodeExecutor, MANAGED_CONTAINERS};
use crate::http::{AgentServer, DispatcherServer, TokenValidator};
use crate::topology::TopologyStore;
use slog::{info, o, Logger};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A server running on a background task
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<Result<(), BoxError>>,
}

impl ServerHandle {
    /// Address actually bound, useful when listening on port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

pub struct DispatcherRuntime {
    server: ServerHandle,
    logger: Logger,
}

impl DispatcherRuntime {
    /// Load the topology and tokens, then start serving.
    pub async fn start(config: DispatcherConfig, logger: Logger) -> Result<Self, BoxError> {
        let logger = logger.new(o!("role" => "dispatcher"));

        let tokens: Arc<dyn TokenValidator> = Arc::new(config.load_tokens().await?);
        let store = Arc::new(TopologyStore::open(&config.topology_path, logger.clone()).await?);
        let client = Arc::new(HttpNodeClient::new(logger.clone())?);
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            client,
            config.settings.clone(),
            logger.clone(),
        ));

        let listener = TcpListener::bind(config.listen_address).await?;
        let local_addr = listener.local_addr()?;
        let server = DispatcherServer::new(dispatcher, tokens, local_addr, logger.clone());
        let task = tokio::spawn(server.serve(listener));

        info!(logger, "Dispatcher started";
            "address" => %local_addr,
            "node_port" => config.settings.node_port,
            "node_timeout_secs" => config.settings.node_timeout.as_secs(),
            "max_parallel" => config.settings.max_parallel
        );

        Ok(Self {
            server: ServerHandle { local_addr, task },
            logger,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn shutdown(self) {
        info!(self.logger, "Shutting down dispatcher");
        self.server.shutdown();
    }
}

pub struct AgentRuntime {
    server: ServerHandle,
    logger: Logger,
}

impl AgentRuntime {
    /// Start an agent backed by the runtime named in `config`
    pub async fn start(config: AgentConfig, logger: Logger) -> Result<Self, BoxError> {
        let runtime: Arc<dyn ContainerRuntime> = match &config.runtime {
            RuntimeKind::Docker { binary } => {
                Arc::new(DockerCli::new(logger.clone()).with_binary(binary.clone()))
            }
            RuntimeKind::Memory => Arc::new(InMemoryRuntime::with_stack(&MANAGED_CONTAINERS)),
        };
        Self::start_with_runtime(config, runtime, logger).await
    }

    /// Start an agent over an explicit container runtime
    pub async fn start_with_runtime(
        config: AgentConfig,
        runtime: Arc<dyn ContainerRuntime>,
        logger: Logger,
    ) -> Result<Self, BoxError> {
        let logger = logger.new(o!("role" => "agent"));

        tokio::fs::create_dir_all(&config.workdir).await?;
        let executor = Arc::new(NodeExecutor::new(runtime, &config.workdir, logger.clone()));

        let listener = TcpListener::bind(config.listen_address).await?;
        let local_addr = listener.local_addr()?;
        let server = AgentServer::new(executor, local_addr, logger.clone());
        let task = tokio::spawn(server.serve(listener));

        info!(logger, "Agent started";
            "address" => %local_addr,
            "workdir" => %config.workdir.display()
        );

        Ok(Self {
            server: ServerHandle { local_addr, task },
            logger,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn shutdown(self) {
        info!(self.logger, "Shutting down agent");
        self.server.shutdown();
    }
}
