//! Request selectors over the topology

use std::fmt;

/// Partial path into the fleet: nothing, a cluster, a server in a cluster,
/// or a container on a server.
///
/// The constructors are the only way to build one, so a server is never
/// selected without its cluster and a container never without both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    cluster: Option<String>,
    server: Option<String>,
    container: Option<String>,
}

impl Address {
    /// Every server in every cluster
    pub fn all() -> Self {
        Self::default()
    }

    pub fn cluster(cluster: impl Into<String>) -> Self {
        Self {
            cluster: Some(cluster.into()),
            ..Self::default()
        }
    }

    pub fn server(cluster: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            cluster: Some(cluster.into()),
            server: Some(server.into()),
            container: None,
        }
    }

    pub fn container(
        cluster: impl Into<String>,
        server: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            cluster: Some(cluster.into()),
            server: Some(server.into()),
            container: Some(container.into()),
        }
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn server_name(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container.as_deref()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments: Vec<&str> = [&self.cluster, &self.server, &self.container]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .collect();
        if segments.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", segments.join("/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Address::all().to_string(), "*");
        assert_eq!(Address::cluster("eu").to_string(), "eu");
        assert_eq!(Address::container("eu", "a", "app").to_string(), "eu/a/app");
    }
}
