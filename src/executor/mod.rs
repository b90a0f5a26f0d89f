//! Node-side execution: artifact rendering and container lifecycle

pub mod artifacts;
pub mod docker;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod runtime;

pub use artifacts::{GeneratedArtifact, Language};
pub use docker::DockerCli;
pub use error::{ArtifactError, ExecutorError, RuntimeError};
pub use lifecycle::{
    CleanReport, ConfigureReport, ContainerAction, ContainerReport, ContainerStates,
    InspectReport, LaunchReport, NodeExecutor, StackAction, MANAGED_CONTAINERS,
};
pub use memory::{InMemoryRuntime, RuntimeOp};
pub use runtime::{CleanupStep, ContainerRuntime, ContainerStatus};
