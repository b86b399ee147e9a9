//! Ezydesk Channel - the request channel between window content and the
//! host process.
//!
//! The hosted web application talks to its native shell through one
//! WebSocket of named JSON messages; this crate owns that boundary. It
//! decodes inbound requests, fans them out to the update coordinator and
//! the collaborator capabilities, and pushes replies and host events back.
//!
//! ## Endpoints
//!
//! - `GET /channel` - WebSocket message channel
//! - `GET /version` - current and latest-known build versions
//!
//! ## Example
//!
//! ```no_run
//! use ezydesk_channel::{Server, ServerConfig};
//!
//! # fn build_state() -> ezydesk_channel::AppState { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let state = build_state();
//!     let server = Server::new(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod capabilities;
pub mod error;
mod handlers;
pub mod models;
pub mod state;
mod ws;

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use capabilities::{
    DocumentExporter, ExportError, ExportMode, ExportRequest, ObjectStore, StoreError, WindowHost,
};
pub use error::ChannelError;
pub use models::{OssCredentials, OutboundMessage};
pub use state::{AppState, ChannelConfig, HostCommand};

/// Default channel port, loopback only.
pub const DEFAULT_PORT: u16 = 48620;

/// Default bind host (localhost only; the channel is for local content).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The request channel server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over the given shared state.
    pub fn new(config: ServerConfig, state: AppState) -> Result<Self, ServerError> {
        // The content may be served from a remote origin.
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = Router::new()
            .route("/channel", get(ws::channel_handler))
            .route("/version", get(get_version))
            .layer(cors)
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("starting request channel on {}", self.addr);

        // SO_REUSEADDR lets a restarted shell rebind past lingering sockets.
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::Bind(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::Bind(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// GET /version - build versions known to the coordinator.
async fn get_version(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "current": state.coordinator.current_version(),
        "latest": state.coordinator.cached_version_info(),
    }))
}
