//! Aggregated dispatch results
//!
//! Results nest by cluster then by server, in configuration order. On the
//! wire each level is a list of single-key objects so the order survives
//! JSON round trips:
//!
//! ```json
//! {"aggregated-responses": [{"eu": [{"a": {...}}, {"b": {"error": "timeout"}}]}],
//!  "all-succeeded": false}
//! ```

use crate::dispatch::error::NodeCallError;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Outcome of one node call
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Success(Value),
    Failure(String),
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success(_))
    }

    /// JSON placed under the server name
    pub fn payload(&self) -> Value {
        match self {
            NodeOutcome::Success(value) => value.clone(),
            NodeOutcome::Failure(reason) => json!({ "error": reason }),
        }
    }
}

impl From<Result<Value, NodeCallError>> for NodeOutcome {
    fn from(result: Result<Value, NodeCallError>) -> Self {
        match result {
            Ok(value) => NodeOutcome::Success(value),
            Err(e) => NodeOutcome::Failure(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub server_name: String,
    pub outcome: NodeOutcome,
    /// Logged, not serialized
    pub latency: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResults {
    pub cluster_name: String,
    pub servers: Vec<NodeResult>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResult {
    pub clusters: Vec<ClusterResults>,
}

impl AggregatedResult {
    /// True when every leaf succeeded, including when there are none
    pub fn all_succeeded(&self) -> bool {
        self.leaves().all(|n| n.outcome.is_success())
    }

    pub fn leaf_count(&self) -> usize {
        self.clusters.iter().map(|c| c.servers.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.leaves().filter(|n| !n.outcome.is_success()).count()
    }

    pub fn node(&self, cluster: &str, server: &str) -> Option<&NodeResult> {
        self.clusters
            .iter()
            .find(|c| c.cluster_name == cluster)?
            .servers
            .iter()
            .find(|n| n.server_name == server)
    }

    fn leaves(&self) -> impl Iterator<Item = &NodeResult> {
        self.clusters.iter().flat_map(|c| c.servers.iter())
    }
}

struct ClusterEntry<'a>(&'a ClusterResults);
struct ServerEntries<'a>(&'a [NodeResult]);
struct ServerEntry<'a>(&'a NodeResult);
struct ClusterEntries<'a>(&'a [ClusterResults]);

impl Serialize for ServerEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.0.server_name, &self.0.outcome.payload())?;
        map.end()
    }
}

impl Serialize for ServerEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(ServerEntry))
    }
}

impl Serialize for ClusterEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.0.cluster_name, &ServerEntries(&self.0.servers))?;
        map.end()
    }
}

impl Serialize for ClusterEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(ClusterEntry))
    }
}

impl Serialize for AggregatedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("aggregated-responses", &ClusterEntries(&self.clusters))?;
        map.serialize_entry("all-succeeded", &self.all_succeeded())?;
        map.end()
    }
}
