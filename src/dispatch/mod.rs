//! Control-side fan-out: commands, node calls and result aggregation

pub mod client;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod result;

pub use client::{HttpNodeClient, NodeCall, NodeClient, NodeEndpoint};
pub use command::Command;
pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::{DispatchError, NodeCallError};
pub use result::{AggregatedResult, ClusterResults, NodeOutcome, NodeResult};
