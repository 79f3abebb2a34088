//! HTTP façade over the sandboxed code runner.
//!
//! Exposes two endpoints: `GET /health` and `POST /execute`. Each execute call
//! is a synchronous RPC; the response body is always an `ExecuteResponse`
//! unless the request was rejected before reaching the runner, in which case
//! it is `{"error": ...}` with a 4xx status.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use codebox_core::{ExecuteRequest, Runner};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Configuration for the execution server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            max_body_size: 4 * 1024 * 1024,
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

#[derive(Clone)]
struct AppState {
    runner: Runner,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Handler for the /execute POST endpoint.
async fn execute_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            log::warn!("Rejected execute request body: {}", rejection.body_text());
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ServerError::PayloadTooLarge(rejection.body_text())
            } else {
                ServerError::invalid_request(rejection.body_text())
            };
            return err.into_response();
        }
    };

    if let Err(e) = request.validate() {
        log::warn!(
            "Invalid execute request (language={}, mode={}): {}",
            request.language,
            request.mode,
            e
        );
        return ServerError::from(e).into_response();
    }

    log::debug!(
        "Executing {} file(s) for language={} mode={}",
        request.files.len(),
        request.language,
        request.mode
    );
    let response = state.runner.execute(&request).await;

    let status = if response.is_timeout() {
        StatusCode::REQUEST_TIMEOUT
    } else {
        StatusCode::OK
    };
    (status, Json(response)).into_response()
}

/// The execution HTTP server.
pub struct ExecutorServer {
    runner: Runner,
    config: ServerConfig,
}

impl ExecutorServer {
    /// Create a new server with default configuration.
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(runner: Runner, config: ServerConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            runner: self.runner.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/execute", post(execute_handler))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async move {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Health probes are frequent; keep them out of info logs
                    let quiet = uri.path() == "/health";
                    if quiet {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    if quiet {
                        log::debug!("Response {} {} in {:?}", request_id, response.status(), duration);
                    } else {
                        log::info!("Response {} {} in {:?}", request_id, response.status(), duration);
                    }
                    response
                },
            ));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Start the server and listen until the process is killed.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    ///
    /// In-flight executions finish before this returns.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "codebox executor listening on {} (runtime: {})",
            self.config.bind_addr,
            self.runner.runtime_name()
        );
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Execute endpoint: http://{}/execute", self.config.bind_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("codebox executor shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
