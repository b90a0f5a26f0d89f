//! JSON bodies shared by the agent and dispatcher servers

use crate::dispatch::DispatchError;
use crate::executor::{ContainerAction, ExecutorError, StackAction};
use crate::topology::TopologyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub role: String,
}

impl HealthResponse {
    pub fn ok(role: &str) -> Self {
        Self {
            status: "ok".to_string(),
            role: role.to_string(),
        }
    }
}

/// Body of every request-level failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

/// Response to a stop or restart of the whole stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub containers: Vec<ContainerAction>,
}

impl From<StackAction> for StackResponse {
    fn from(action: StackAction) -> Self {
        let failed: Vec<_> = action
            .containers
            .iter()
            .filter_map(|c| c.error.as_ref().map(|e| format!("{}: {}", c.container, e)))
            .collect();

        Self {
            status: if failed.is_empty() { "ok" } else { "error" }.to_string(),
            error: (!failed.is_empty()).then(|| failed.join("; ")),
            containers: action.containers,
        }
    }
}

/// One entry of the dispatcher's `/help` catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpResponse {
    pub routes: Vec<RouteInfo>,
}

/// A request-level failure rendered as `{"status":"error","error":…}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error".to_string(),
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TopologyError> for ApiError {
    fn from(e: TopologyError) -> Self {
        let status = match &e {
            TopologyError::Missing { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TopologyError::DuplicateCluster(_)
            | TopologyError::DuplicateServer { .. }
            | TopologyError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Topology(e) => e.into(),
            DispatchError::UnknownCommand(_) => ApiError::new(StatusCode::NOT_FOUND, e.to_string()),
            DispatchError::ContainerNotAccepted(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
            }
        }
    }
}

impl From<ExecutorError> for ApiError {
    fn from(e: ExecutorError) -> Self {
        let status = match &e {
            ExecutorError::Artifact(_) => StatusCode::BAD_REQUEST,
            ExecutorError::NotConfigured(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ContainerStatus;
    use std::path::PathBuf;

    #[test]
    fn test_error_status_codes() {
        let missing = ApiError::from(DispatchError::Topology(TopologyError::Missing {
            path: PathBuf::from("config.json"),
        }));
        assert_eq!(missing.status, StatusCode::SERVICE_UNAVAILABLE);

        let duplicate = ApiError::from(TopologyError::DuplicateCluster("eu".into()));
        assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);

        let unconfigured = ApiError::from(ExecutorError::NotConfigured(PathBuf::from("docker-compose.yml")));
        assert_eq!(unconfigured.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_stack_response_collects_errors() {
        let response = StackResponse::from(StackAction {
            containers: vec![
                ContainerAction {
                    container: "app".into(),
                    state: Some(ContainerStatus::Running),
                    error: Some("stop timed out".into()),
                },
                ContainerAction {
                    container: "database".into(),
                    state: Some(ContainerStatus::Stopped),
                    error: None,
                },
            ],
        });

        assert_eq!(response.status, "error");
        assert_eq!(response.error.as_deref(), Some("app: stop timed out"));
    }
}
