//! The two halves of a streaming call.
//!
//! Services only see [`Inbound`] and [`Outbound`]; the transport binding
//! decides what sits behind them. Over gRPC the request side is tonic's
//! [`Streaming`] and the response side is a [`GrpcOutbound`] whose drain is the
//! response body. The channel-backed halves are what tests drive directly.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Status, Streaming};

use crate::error::CallError;

/// Receiving half of a call.
#[async_trait]
pub trait Inbound<T>: Send {
    /// Next item; `Ok(None)` once the caller half-closes.
    async fn recv(&mut self) -> Result<Option<T>, CallError>;
}

/// Sending half of a call.
#[async_trait]
pub trait Outbound<T>: Send + Sync {
    /// Queue one item for the caller.
    async fn send(&self, item: T) -> Result<(), CallError>;
}

/// [`Inbound`] fed through an mpsc channel.
///
/// A closed channel reads as half-close; a feeder that wants the call to fail
/// pushes an `Err` first.
#[derive(Debug)]
pub struct ChannelInbound<T> {
    rx: mpsc::Receiver<Result<T, CallError>>,
}

/// Create a channel-backed inbound half and its feeder.
pub fn inbound_channel<T>(capacity: usize) -> (mpsc::Sender<Result<T, CallError>>, ChannelInbound<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ChannelInbound { rx })
}

#[async_trait]
impl<T: Send> Inbound<T> for ChannelInbound<T> {
    async fn recv(&mut self) -> Result<Option<T>, CallError> {
        match self.rx.recv().await {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// [`Outbound`] drained through an mpsc channel.
#[derive(Debug)]
pub struct ChannelOutbound<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for ChannelOutbound<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Create a channel-backed outbound half and its drain.
pub fn outbound_channel<T>(capacity: usize) -> (ChannelOutbound<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelOutbound { tx }, rx)
}

#[async_trait]
impl<T: Send> Outbound<T> for ChannelOutbound<T> {
    async fn send(&self, item: T) -> Result<(), CallError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| CallError::Unavailable("response stream closed".into()))
    }
}

#[async_trait]
impl<T: Send + 'static> Inbound<T> for Streaming<T> {
    async fn recv(&mut self) -> Result<Option<T>, CallError> {
        self.message().await.map_err(CallError::from)
    }
}

/// [`Outbound`] feeding a gRPC response stream.
///
/// The receiving end is handed to tonic as the response body; once the caller
/// goes away tonic drops it and further sends fail.
#[derive(Debug)]
pub struct GrpcOutbound<T> {
    tx: mpsc::Sender<Result<T, Status>>,
}

/// Response stream type returned from streaming gRPC methods.
pub type ResponseStream<T> = ReceiverStream<Result<T, Status>>;

/// Create a gRPC outbound half and the response stream it feeds.
pub fn grpc_outbound<T>(capacity: usize) -> (GrpcOutbound<T>, ResponseStream<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (GrpcOutbound { tx }, ReceiverStream::new(rx))
}

impl<T> GrpcOutbound<T> {
    /// End the response stream with `err` as its status.
    pub async fn fail(&self, err: CallError) {
        let _ = self.tx.send(Err(Status::from(err))).await;
    }
}

#[async_trait]
impl<T: Send> Outbound<T> for GrpcOutbound<T> {
    async fn send(&self, item: T) -> Result<(), CallError> {
        self.tx
            .send(Ok(item))
            .await
            .map_err(|_| CallError::Unavailable("caller went away".into()))
    }
}
