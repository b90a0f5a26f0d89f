//! Node agent HTTP server
//!
//! Exposes the node executor to the dispatcher. Routes carry no cluster or
//! server segments; the agent only ever speaks for its own node.

use crate::executor::{ContainerAction, NodeExecutor};
use crate::http::messages::{ApiError, HealthResponse, StackResponse};
use crate::topology::Configuration;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use slog::{error, info, Logger};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AgentServer {
    executor: Arc<NodeExecutor>,
    address: SocketAddr,
    logger: Logger,
}

impl AgentServer {
    pub fn new(executor: Arc<NodeExecutor>, address: SocketAddr, logger: Logger) -> Self {
        Self {
            executor,
            address,
            logger,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/configure", post(handle_configure))
            .route("/start", get(handle_start_stack))
            .route("/start/{container}", get(handle_start))
            .route("/stop", get(handle_stop_stack))
            .route("/stop/{container}", get(handle_stop))
            .route("/restart", get(handle_restart_stack))
            .route("/restart/{container}", get(handle_restart))
            .route("/check-alive", get(handle_check_alive))
            .route("/inspect", get(handle_inspect))
            .route("/clean", get(handle_clean))
            .route("/health", get(handle_health))
            .with_state(self.clone())
    }

    /// Bind the configured address and serve until the process exits
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.address).await.map_err(|e| {
            error!(self.logger, "Failed to bind agent server"; "error" => %e);
            e
        })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();
        let local = listener.local_addr()?;
        info!(self.logger, "Agent server listening";
            "address" => %local,
            "workdir" => %self.executor.workdir().display()
        );

        axum::serve(listener, app).await.map_err(|e| {
            error!(self.logger, "Agent server error"; "error" => %e);
            e
        })?;

        Ok(())
    }
}

fn container_response(action: ContainerAction) -> Response {
    let status = if action.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(action)).into_response()
}

fn stack_response(response: StackResponse) -> Response {
    let status = if response.error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response)).into_response()
}

async fn handle_configure(
    State(server): State<AgentServer>,
    body: Result<Json<Configuration>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(config) = body.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;

    info!(server.logger, "Configure request";
        "language" => &config.artifact.application.language
    );

    let report = server.executor.configure(config).await.map_err(|e| {
        error!(server.logger, "Configure failed"; "error" => %e);
        ApiError::from(e)
    })?;
    Ok(Json(report).into_response())
}

async fn handle_start_stack(State(server): State<AgentServer>) -> Result<Response, ApiError> {
    info!(server.logger, "Start stack request");
    let report = server.executor.start_stack().await.map_err(|e| {
        error!(server.logger, "Stack launch failed"; "error" => %e);
        ApiError::from(e)
    })?;
    Ok(Json(report).into_response())
}

async fn handle_start(State(server): State<AgentServer>, Path(container): Path<String>) -> Response {
    info!(server.logger, "Start request"; "container" => &container);
    container_response(server.executor.start(&container).await)
}

async fn handle_stop_stack(State(server): State<AgentServer>) -> Response {
    info!(server.logger, "Stop stack request");
    stack_response(server.executor.stop_stack().await.into())
}

async fn handle_stop(State(server): State<AgentServer>, Path(container): Path<String>) -> Response {
    info!(server.logger, "Stop request"; "container" => &container);
    container_response(server.executor.stop(&container).await)
}

async fn handle_restart_stack(State(server): State<AgentServer>) -> Response {
    info!(server.logger, "Restart stack request");
    stack_response(server.executor.restart_stack().await.into())
}

async fn handle_restart(State(server): State<AgentServer>, Path(container): Path<String>) -> Response {
    info!(server.logger, "Restart request"; "container" => &container);
    container_response(server.executor.restart(&container).await)
}

async fn handle_check_alive(State(server): State<AgentServer>) -> Result<Response, ApiError> {
    let states = server.executor.check_alive().await?;
    Ok(Json(states).into_response())
}

async fn handle_inspect(State(server): State<AgentServer>) -> Result<Response, ApiError> {
    let report = server.executor.inspect().await?;
    Ok(Json(report).into_response())
}

async fn handle_clean(State(server): State<AgentServer>) -> Response {
    info!(server.logger, "Clean request");
    Json(server.executor.clean().await).into_response()
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse::ok("agent"))
}
