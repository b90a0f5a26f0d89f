pub mod config;
pub mod dispatch;
pub mod executor;
pub mod fs;
pub mod http;
pub mod logging;
pub mod runtime;
pub mod topology;

pub use config::{AgentConfig, ConfigError, DispatcherConfig, RuntimeKind};
pub use dispatch::{AggregatedResult, Command, DispatchError, DispatchSettings, Dispatcher, NodeOutcome};
pub use executor::{ContainerRuntime, ContainerStatus, DockerCli, InMemoryRuntime, NodeExecutor};
pub use runtime::{AgentRuntime, DispatcherRuntime};
pub use topology::{Address, Configuration, TopologyError, TopologyStore};
