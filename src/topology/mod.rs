//! Fleet topology: the declarative configuration, address selectors and the
//! write-once store that resolves addresses to servers.

pub mod address;
pub mod error;
pub mod model;
pub mod store;

pub use address::Address;
pub use error::TopologyError;
pub use model::{Artifact, Cluster, Configuration, Server};
pub use store::{Resolution, ResolvedCluster, TopologyStore};
