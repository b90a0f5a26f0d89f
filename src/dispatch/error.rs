use crate::dispatch::command::Command;
use crate::topology::TopologyError;
use thiserror::Error;

/// Failure of a single node call. Always captured per node, never raised
/// to the dispatch caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeCallError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The node answered with a non-2xx status
    #[error("{status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timeout")]
    Timeout,
}

/// Errors that fail a whole dispatch request
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("command '{0}' does not accept a container")]
    ContainerNotAccepted(Command),
}
