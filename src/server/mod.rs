//! HTTP and websocket surface.
//!
//! Routes:
//! - `GET /ws/chat/{user_id}/{session_id}` upgrades to a chat channel
//! - `GET /` serves `index.html` from the static directory
//! - `GET /static/*` serves the static directory

pub mod connection;

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path as UrlPath, State};
use axum::response::IntoResponse;
use axum::routing::{get, get_service};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::chat::ChatOrchestrator;
use crate::models::SessionKey;

pub use connection::{ChannelClosed, ChatChannel, ConnectionHandler, WsChannel};

/// Errors running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct ChatContext {
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl ChatContext {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Build the application router.
pub fn create_router(ctx: ChatContext, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws/chat/{user_id}/{session_id}", get(chat_socket))
        .route("/", get_service(ServeFile::new(static_dir.join("index.html"))))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

async fn chat_socket(
    ws: WebSocketUpgrade,
    UrlPath((user_id, session_id)): UrlPath<(String, String)>,
    State(ctx): State<ChatContext>,
) -> impl IntoResponse {
    let session = SessionKey::new(user_id, session_id);
    ws.on_upgrade(move |socket| async move {
        let handler = ConnectionHandler::new(session, ctx.orchestrator);
        handler.run(&mut WsChannel::new(socket)).await;
    })
}

/// Bind the listen address.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
        addr: addr.to_string(),
        source: e,
    })
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "prchat listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
