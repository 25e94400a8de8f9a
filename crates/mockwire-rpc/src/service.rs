//! The four-method mock call service.

use std::sync::Arc;
use std::time::Duration;

use mockwire_core::Clock;
use tracing::{debug, info, instrument};

use crate::context::CallContext;
use crate::coordinator::{BidiOutcome, run_bidi};
use crate::error::CallError;
use crate::stream::{Inbound, Outbound};
use crate::types::{SimpleRequest, SimpleResponse, StreamRequest, StreamResponse};

/// Method names, as they appear in call paths.
pub mod methods {
    /// Unary echo.
    pub const ECHO: &str = "Echo";
    /// Fixed-length server stream.
    pub const SERVER_STREAM: &str = "ServerStream";
    /// Collect-then-reply client stream.
    pub const CLIENT_STREAM: &str = "ClientStream";
    /// Duplex echo.
    pub const BIDI_STREAM: &str = "BidiStream";
}

/// Deterministic responses for the four call shapes.
#[derive(Clone, Debug)]
pub struct MockService {
    clock: Arc<dyn Clock>,
    server_stream_count: u32,
    server_stream_interval: Duration,
}

impl MockService {
    /// Service with five server-stream responses 100ms apart.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            server_stream_count: 5,
            server_stream_interval: Duration::from_millis(100),
        }
    }

    /// Change the shape of `ServerStream`.
    #[must_use]
    pub fn with_server_stream(mut self, count: u32, interval: Duration) -> Self {
        self.server_stream_count = count;
        self.server_stream_interval = interval;
        self
    }

    /// Unary: one request, one reply.
    #[instrument(skip_all, fields(value = request.value))]
    pub async fn echo(
        &self,
        ctx: &CallContext,
        request: SimpleRequest,
    ) -> Result<SimpleResponse, CallError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        debug!(message = %request.message, "echo request");
        Ok(SimpleResponse {
            message: format!("Echo: {} (value: {})", request.message, request.value),
            timestamp: self.clock.now(),
        })
    }

    /// Server streaming: a fixed number of numbered replies to one request.
    ///
    /// Cancellation is checked before every send and while waiting between
    /// sends.
    #[instrument(skip_all, fields(id = %request.id))]
    pub async fn server_stream<O>(
        &self,
        ctx: &CallContext,
        request: StreamRequest,
        outbound: &O,
    ) -> Result<u32, CallError>
    where
        O: Outbound<StreamResponse> + ?Sized,
    {
        let count = self.server_stream_count;
        for i in 1..=count {
            if let Some(err) = ctx.err() {
                debug!(sent = i - 1, error = %err, "server stream interrupted");
                return Err(err);
            }
            let sequence = i32::try_from(i)
                .map_err(|_| CallError::Internal("sequence overflow".into()))?;
            outbound
                .send(StreamResponse {
                    id: request.id.clone(),
                    data: format!("{} - response {i}", request.data),
                    timestamp: self.clock.now(),
                    sequence,
                })
                .await?;
            if i < count {
                tokio::select! {
                    err = ctx.done() => return Err(err),
                    () = tokio::time::sleep(self.server_stream_interval) => {}
                }
            }
        }
        info!(sent = count, "server stream completed");
        Ok(count)
    }

    /// Client streaming: collect until half-close, then reply once.
    #[instrument(skip_all)]
    pub async fn client_stream<I>(
        &self,
        ctx: &CallContext,
        inbound: &mut I,
    ) -> Result<SimpleResponse, CallError>
    where
        I: Inbound<StreamRequest> + ?Sized,
    {
        let mut received = Vec::new();
        loop {
            let next = tokio::select! {
                err = ctx.done() => return Err(err),
                next = inbound.recv() => next?,
            };
            match next {
                Some(item) => {
                    debug!(id = %item.id, count = received.len() + 1, "client stream item");
                    received.push(item.data);
                }
                None => break,
            }
        }
        info!(count = received.len(), "client stream completed");
        Ok(SimpleResponse {
            message: format!(
                "Received {} messages: [{}]",
                received.len(),
                received.join(" ")
            ),
            timestamp: self.clock.now(),
        })
    }

    /// Duplex: one numbered echo per request item, in order.
    pub async fn bidi_stream<I, O>(
        &self,
        ctx: &CallContext,
        inbound: I,
        outbound: &O,
    ) -> Result<BidiOutcome, CallError>
    where
        I: Inbound<StreamRequest>,
        O: Outbound<StreamResponse> + ?Sized,
    {
        let clock = Arc::clone(&self.clock);
        run_bidi(ctx, inbound, outbound, move |request: StreamRequest, sequence| {
            StreamResponse {
                id: request.id,
                data: format!("Echo: {} (processed)", request.data),
                timestamp: clock.now(),
                sequence,
            }
        })
        .await
    }
}
