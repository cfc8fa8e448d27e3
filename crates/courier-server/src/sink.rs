//! Outbound half of a connection.
//!
//! [`FrameSink`] is the only way the relay writes to a client. [`WsSink`]
//! wraps the write half of an Axum `WebSocket` and bounds every write with a
//! timeout, so a stalled peer costs at most one timeout per attempt.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::Mutex;

/// Outbound write failures.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The transport rejected the write.
    #[error("transport error: {0}")]
    Transport(String),
    /// The write did not finish within the configured bound.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    /// The sink was already closed.
    #[error("sink closed")]
    Closed,
    /// The frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Writes text frames to one client.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write one text frame.
    async fn send_text(&self, text: String) -> Result<(), SinkError>;

    /// Send a close frame and shut the write half. Best effort.
    async fn close(&self);
}

/// [`FrameSink`] over the write half of an Axum `WebSocket`.
///
/// Generic over the underlying [`Sink`] so the write bound applies to any
/// transport that accepts WebSocket messages.
pub struct WsSink<S = SplitSink<WebSocket, Message>> {
    inner: Mutex<Option<S>>,
    write_timeout: Duration,
}

impl<S> WsSink<S> {
    /// Wrap a split write half.
    pub fn new(inner: S, write_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Some(inner)),
            write_timeout,
        }
    }
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: fmt::Display,
{
    async fn send_text(&self, text: String) -> Result<(), SinkError> {
        let write = async {
            let mut guard = self.inner.lock().await;
            let sink = guard.as_mut().ok_or(SinkError::Closed)?;
            sink.send(Message::Text(text.into()))
                .await
                .map_err(|e| SinkError::Transport(e.to_string()))
        };
        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| SinkError::Timeout(self.write_timeout))?
    }

    async fn close(&self) {
        let shutdown = async {
            let mut guard = self.inner.lock().await;
            if let Some(mut sink) = guard.take() {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
            }
        };
        let _ = tokio::time::timeout(self.write_timeout, shutdown).await;
    }
}
