//! Frame-level transport seam between sessions and the socket.
//!
//! A session reads through a [`FrameSource`] and writes through a
//! [`FrameSink`]. The WebSocket halves implement both; tests drive sessions
//! through in-process doubles instead of a socket.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use mockwire_core::Frame;
use thiserror::Error;

/// Transport failure on one connection.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The write deadline passed before the frame was written.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    /// The connection was already closed locally.
    #[error("connection closed")]
    Closed,
    /// The socket reported an error.
    #[error("transport error: {0}")]
    Io(String),
}

/// Writing half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    /// Send a close frame and shut the writer.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reading half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next content frame; `Ok(None)` once the peer has closed.
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// [`FrameSink`] over the write half of an upgraded socket.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WsSink {
    /// Wrap a split write half.
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let sent = self
            .inner
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::Io(e.to_string()));
        let _ = self.inner.close().await;
        sent
    }
}

/// [`FrameSource`] over the read half of an upgraded socket.
///
/// Control frames are consumed here; a close frame reads as end of input.
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

impl WsSource {
    /// Wrap a split read half.
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let message = match self.inner.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
                Some(Ok(message)) => message,
            };
            match message {
                Message::Text(text) => return Ok(Some(Frame::Text(text.as_str().to_owned()))),
                Message::Binary(bytes) => return Ok(Some(Frame::Binary(bytes.to_vec()))),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }
}
