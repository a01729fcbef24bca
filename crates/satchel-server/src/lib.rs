//! HTTP adapter for satchel sessions.
//!
//! This crate binds the session manager's cookie contract to axum and
//! serves a small demo application on top of it.
//!
//! # Features
//!
//! - `Cookie` / `Set-Cookie` bindings for the session manager
//! - Visit counter at `/` and session deletion at `/delete-session`
//! - Health check at `/health`
//! - Request logging
//!
//! # Example
//!
//! ```ignore
//! use satchel_server::{Server, ServerConfig};
//! use satchel_session::{SessionManager, SessionOptions};
//!
//! let sessions = SessionManager::new(SessionOptions::default());
//! let config = ServerConfig::new().with_bind_address("127.0.0.1:8080".parse()?);
//!
//! let server = Server::new(sessions, config);
//! server.run().await?;
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use cookies::{RequestCookies, ResponseCookies, format_set_cookie, to_http_cookie};
pub use error::{Result, ServerError};
pub use logging::request_logging_middleware;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, middleware};
use satchel_session::SessionManager;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The satchel HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a new server over `sessions` with the given configuration.
    pub fn new(sessions: SessionManager, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(sessions, config),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .merge(routes::session_routes())
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                logging::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.serve(addr, std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves, then drain connections.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind_address;
        self.serve(addr, shutdown).await
    }

    async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        info!("Starting server on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    /// The session manager behind this server.
    pub fn sessions(&self) -> &SessionManager {
        &self.state.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use satchel_session::SessionOptions;
    use tower::ServiceExt;

    fn create_test_server() -> Server {
        Server::new(
            SessionManager::new(SessionOptions::default()),
            ServerConfig::new().with_request_logging(false),
        )
    }

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let app = create_test_server().router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_test_server().router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_counter_through_router() {
        let server = create_test_server();
        let app = server.router();

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("set-cookie"));
        assert_eq!(server.sessions().len(), 1);
    }
}
