//! Dispatcher to node calls

use crate::dispatch::command::Command;
use crate::dispatch::error::NodeCallError;
use crate::topology::model::{Configuration, Server};
use async_trait::async_trait;
use serde_json::Value;
use slog::{debug, warn, Logger};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Where a node agent listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    host: String,
    port: u16,
}

impl NodeEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The server's control port, or `default_port` when it declares none
    pub fn for_server(server: &Server, default_port: u16) -> Self {
        Self::new(server.ip.clone(), server.control_port.unwrap_or(default_port))
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One command addressed to one node
#[derive(Debug, Clone)]
pub struct NodeCall {
    pub command: Command,
    pub container: Option<String>,
    /// Sent as the request body when the command carries one
    pub body: Option<Arc<Configuration>>,
}

impl NodeCall {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            container: None,
            body: None,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_body(mut self, body: Arc<Configuration>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn path(&self) -> String {
        self.command.node_path(self.container.as_deref())
    }
}

/// Issues a command to a node agent and returns its JSON payload
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn call(&self, endpoint: &NodeEndpoint, call: &NodeCall) -> Result<Value, NodeCallError>;
}

/// [`NodeClient`] over HTTP using reqwest
pub struct HttpNodeClient {
    client: reqwest::Client,
    logger: Logger,
}

impl HttpNodeClient {
    pub fn new(logger: Logger) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            // agents are addressed directly, never through a proxy
            .no_proxy()
            .build()?;

        Ok(Self { client, logger })
    }
}

/// The node's `error` field when the body is structured, the raw text otherwise
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn call(&self, endpoint: &NodeEndpoint, call: &NodeCall) -> Result<Value, NodeCallError> {
        let url = format!("{}{}", endpoint.base_url(), call.path());

        debug!(self.logger, "Sending node request";
            "url" => &url,
            "command" => %call.command
        );

        let request = if call.command.carries_body() {
            let mut request = self.client.post(&url);
            if let Some(body) = &call.body {
                request = request.json(body.as_ref());
            }
            request
        } else {
            self.client.get(&url)
        };

        let response = request.send().await.map_err(|e| {
            warn!(self.logger, "Node request failed"; "error" => %e, "url" => &url);
            NodeCallError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NodeCallError::Malformed(e.to_string()))?;

        if !status.is_success() {
            warn!(self.logger, "Node request returned error status";
                "status" => status.as_u16(),
                "url" => &url
            );
            return Err(NodeCallError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| NodeCallError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_falls_back_to_default_port() {
        let mut server = Server {
            name: "a".into(),
            ip: "10.0.0.1".into(),
            ..Default::default()
        };
        assert_eq!(
            NodeEndpoint::for_server(&server, 8080).base_url(),
            "http://10.0.0.1:8080"
        );

        server.control_port = Some(9100);
        assert_eq!(
            NodeEndpoint::for_server(&server, 8080).base_url(),
            "http://10.0.0.1:9100"
        );
    }

    #[test]
    fn test_call_path() {
        let call = NodeCall::new(Command::Stop).with_container("database");
        assert_eq!(call.path(), "/stop/database");
        assert_eq!(NodeCall::new(Command::Clean).path(), "/clean");
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(
            rejection_message(r#"{"status":"error","error":"node is not configured"}"#),
            "node is not configured"
        );
        assert_eq!(rejection_message("bad gateway\n"), "bad gateway");
        assert_eq!(
            NodeCallError::Rejected {
                status: 500,
                message: "boom".into()
            }
            .to_string(),
            "500: boom"
        );
    }
}
