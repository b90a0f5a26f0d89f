//! Client-facing dispatcher HTTP server
//!
//! `/{command}[/{cluster}[/{server}[/{container}]]]` fans the command out to
//! the selected nodes. `configure` is POST, every other command is GET.
//! `/health` and `/help` are open; everything else needs a token.

use crate::dispatch::{Command, DispatchError, Dispatcher};
use crate::http::auth::{require_token, TokenValidator};
use crate::http::messages::{ApiError, HealthResponse, HelpResponse, RouteInfo};
use crate::topology::{Address, Configuration};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use slog::{error, info, Logger};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

const COMMAND_ROUTES: [&str; 4] = [
    "/{command}",
    "/{command}/{cluster}",
    "/{command}/{cluster}/{server}",
    "/{command}/{cluster}/{server}/{container}",
];

#[derive(Clone)]
pub struct DispatcherServer {
    dispatcher: Arc<Dispatcher>,
    tokens: Arc<dyn TokenValidator>,
    address: SocketAddr,
    logger: Logger,
}

impl DispatcherServer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        tokens: Arc<dyn TokenValidator>,
        address: SocketAddr,
        logger: Logger,
    ) -> Self {
        Self {
            dispatcher,
            tokens,
            address,
            logger,
        }
    }

    pub fn router(&self) -> Router {
        let mut protected = Router::new();
        for path in COMMAND_ROUTES {
            protected = protected.route(path, get(handle_get).post(handle_configure));
        }
        let protected = protected.route_layer(middleware::from_fn_with_state(
            self.tokens.clone(),
            require_token,
        ));

        Router::new()
            .route("/health", get(handle_health))
            .route("/help", get(handle_help))
            .merge(protected)
            .layer(CorsLayer::permissive())
            .with_state(self.clone())
    }

    /// Bind the configured address and serve until the process exits
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.address).await.map_err(|e| {
            error!(self.logger, "Failed to bind dispatcher server"; "error" => %e);
            e
        })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.router();
        let local = listener.local_addr()?;
        info!(self.logger, "Dispatcher server listening";
            "address" => %local,
            "topology" => %self.dispatcher.store().path().display()
        );

        axum::serve(listener, app).await.map_err(|e| {
            error!(self.logger, "Dispatcher server error"; "error" => %e);
            e
        })?;

        Ok(())
    }
}

fn address_from(params: &HashMap<String, String>) -> Address {
    match (
        params.get("cluster"),
        params.get("server"),
        params.get("container"),
    ) {
        (Some(cluster), Some(server), Some(container)) => {
            Address::container(cluster, server, container)
        }
        (Some(cluster), Some(server), None) => Address::server(cluster, server),
        (Some(cluster), None, _) => Address::cluster(cluster),
        _ => Address::all(),
    }
}

fn parse_command(params: &HashMap<String, String>) -> Result<Command, ApiError> {
    let name = params.get("command").map(String::as_str).unwrap_or_default();
    name.parse::<Command>().map_err(ApiError::from)
}

fn wrong_method(command: Command, expected: &str) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("{} must be sent as {}", command, expected),
    )
}

async fn run(
    server: &DispatcherServer,
    command: Command,
    address: Address,
    supplied: Option<Configuration>,
) -> Result<Response, ApiError> {
    info!(server.logger, "Dispatch request"; "command" => %command, "address" => %address);

    let result = server
        .dispatcher
        .dispatch(command, &address, supplied)
        .await
        .map_err(|e: DispatchError| {
            error!(server.logger, "Dispatch failed"; "command" => %command, "error" => %e);
            ApiError::from(e)
        })?;

    Ok(Json(result).into_response())
}

async fn handle_get(
    State(server): State<DispatcherServer>,
    Path(params): Path<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let command = parse_command(&params)?;
    if command.carries_body() {
        return Err(wrong_method(command, "POST"));
    }
    run(&server, command, address_from(&params), None).await
}

/// POST `configure`; the optional body seeds the topology when none is stored
async fn handle_configure(
    State(server): State<DispatcherServer>,
    Path(params): Path<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let command = parse_command(&params)?;
    if !command.carries_body() {
        return Err(wrong_method(command, "GET"));
    }

    let supplied = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let config: Configuration = serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("malformed configuration: {}", e))
        })?;
        Some(config)
    };

    run(&server, command, address_from(&params), supplied).await
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse::ok("dispatcher"))
}

async fn handle_help() -> Json<HelpResponse> {
    let route = |method: &str, path: &str, description: &str| RouteInfo {
        method: method.to_string(),
        path: path.to_string(),
        description: description.to_string(),
    };

    Json(HelpResponse {
        routes: vec![
            route("POST", "/configure[/{cluster}[/{server}]]", "Persist the fleet configuration (first call only) and render deployment files on the selected nodes"),
            route("GET", "/start[/{cluster}[/{server}[/{container}]]]", "Launch the whole stack, or start one container"),
            route("GET", "/stop[/{cluster}[/{server}[/{container}]]]", "Stop every managed container, or one container"),
            route("GET", "/restart[/{cluster}[/{server}[/{container}]]]", "Restart every managed container, or one container"),
            route("GET", "/check-alive[/{cluster}[/{server}]]", "Report whether app and database are running"),
            route("GET", "/inspect[/{cluster}[/{server}]]", "Show the node configuration next to live container states"),
            route("GET", "/clean[/{cluster}[/{server}]]", "Remove managed containers and prune images and volumes"),
            route("GET", "/health", "Liveness of the dispatcher"),
            route("GET", "/help", "This list"),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_address_from_path() {
        assert_eq!(address_from(&params(&[("command", "stop")])), Address::all());
        assert_eq!(
            address_from(&params(&[("command", "stop"), ("cluster", "eu")])),
            Address::cluster("eu")
        );
        assert_eq!(
            address_from(&params(&[
                ("command", "stop"),
                ("cluster", "eu"),
                ("server", "a"),
                ("container", "app")
            ])),
            Address::container("eu", "a", "app")
        );
    }

    #[test]
    fn test_unknown_command_is_not_found() {
        let err = parse_command(&params(&[("command", "deploy")])).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
