//! WebSocket server
//!
//! Accepts device connections and hands each socket to a fresh session
//! orchestrator. Everything stateful lives in the session; the server keeps
//! only the shared configuration and the auth gate.

pub mod auth;
pub mod manage_api;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, RawQuery, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::server::auth::AuthGate;
use crate::session;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthGate>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        let auth = Arc::new(AuthGate::new(&config.auth));
        Self {
            config: Arc::new(config),
            auth,
        }
    }
}

/// Start the server and block until it exits
pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid listen address")?;
    let state = ServerState::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/voxlink/v1/", get(ws_handler))
        .route("/voxlink/v1", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Listening on ws://{addr}/voxlink/v1/");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(move |socket: WebSocket| {
        session::handle_connection(socket, addr, headers, query, state)
    })
}
