use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use futures_util::stream::SplitSink;

use crate::error::{GatewayError, GatewayResult};

/// Write half of a push transport. The registry owns one per connected user
/// and serialises every call through a per-connection mutex.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> GatewayResult<()>;

    /// Keep-alive probe; transports without one may ignore it.
    async fn send_ping(&mut self) -> GatewayResult<()> {
        Ok(())
    }

    /// After `close`, every further send fails.
    async fn close(&mut self);
}

/// Websocket write half as split off by `futures_util::StreamExt::split`.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    fn ensure_open(&self) -> GatewayResult<()> {
        if self.closed {
            Err(GatewayError::Transport("connection closed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> GatewayResult<()> {
        self.ensure_open()?;
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn send_ping(&mut self) -> GatewayResult<()> {
        self.ensure_open()?;
        self.inner
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.inner.close().await;
        }
    }
}
