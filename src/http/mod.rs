//! HTTP layer
//!
//! Two axum servers share this module:
//! - the agent, one per server node, exposing the node executor
//! - the dispatcher, client-facing, fanning commands out to the agents
//!
//! Both answer failures with structured JSON bodies.

pub mod agent;
pub mod auth;
pub mod dispatcher;
pub mod messages;

pub use agent::AgentServer;
pub use auth::{StaticTokens, TokenValidator};
pub use dispatcher::DispatcherServer;
pub use messages::{ApiError, ErrorResponse, HealthResponse};
