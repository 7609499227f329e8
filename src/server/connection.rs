//! Per-connection receive loop.
//!
//! One handler serves one chat channel for its whole life. Frames are
//! handled strictly in arrival order; each produces exactly one outbound
//! text frame, either the reply or an error message. Failures never close
//! the channel. The loop ends when the client disconnects.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use thiserror::Error;

use crate::chat::ChatOrchestrator;
use crate::constants::ERROR_REPLY_PREFIX;
use crate::models::{ChatRequest, SessionKey};

/// The peer is gone; nothing more can be sent.
#[derive(Error, Debug)]
#[error("chat channel closed: {0}")]
pub struct ChannelClosed(pub String);

/// A bidirectional text channel to one client.
#[async_trait]
pub trait ChatChannel: Send {
    /// Next inbound text frame, or `None` once the client has disconnected.
    async fn recv(&mut self) -> Option<String>;

    async fn send(&mut self, text: String) -> Result<(), ChannelClosed>;
}

/// [`ChatChannel`] over an axum websocket.
pub struct WsChannel {
    socket: WebSocket,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ChatChannel for WsChannel {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.socket.recv().await? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                // axum answers pings itself.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Binary(data)) => {
                    tracing::debug!(bytes = data.len(), "ignoring binary frame");
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "client sent close frame");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "websocket receive failed");
                    return None;
                }
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), ChannelClosed> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChannelClosed(e.to_string()))
    }
}

/// Runs the receive loop for one session's channel.
pub struct ConnectionHandler {
    session: SessionKey,
    orchestrator: Arc<ChatOrchestrator>,
    conn_id: uuid::Uuid,
}

impl ConnectionHandler {
    pub fn new(session: SessionKey, orchestrator: Arc<ChatOrchestrator>) -> Self {
        Self {
            session,
            orchestrator,
            conn_id: uuid::Uuid::new_v4(),
        }
    }

    /// Serve `channel` until the client disconnects.
    pub async fn run<C: ChatChannel>(&self, channel: &mut C) {
        tracing::info!(conn_id = %self.conn_id, session = %self.session, "chat connection opened");
        let mut handled = 0usize;

        while let Some(frame) = channel.recv().await {
            let outbound = self.handle_frame(&frame).await;
            handled += 1;
            if let Err(e) = channel.send(outbound).await {
                tracing::debug!(conn_id = %self.conn_id, error = %e, "client went away mid-reply");
                break;
            }
        }

        tracing::info!(
            conn_id = %self.conn_id,
            session = %self.session,
            messages = handled,
            "chat connection closed"
        );
    }

    /// Turn one inbound frame into the text sent back.
    async fn handle_frame(&self, frame: &str) -> String {
        let request = match ChatRequest::parse(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(conn_id = %self.conn_id, error = %e, "malformed chat frame");
                return format!("{ERROR_REPLY_PREFIX} invalid message: {e}");
            }
        };

        let pr = request.pull_request();
        match self
            .orchestrator
            .handle_message(&self.session, &request.message, pr.as_ref())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(conn_id = %self.conn_id, session = %self.session, error = %e, "message failed");
                e.user_message()
            }
        }
    }
}
