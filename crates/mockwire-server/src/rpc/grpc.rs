//! `mock.MockService` over gRPC on the stream listener.
//!
//! Unary and client-streaming calls run on the request task. Server-streaming
//! and duplex calls run on their own task that feeds the response body, and
//! end the body with the call's status when they fail.

use std::future::Future;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use mockwire_rpc::pb::mock_service_server::{self, MockServiceServer};
use mockwire_rpc::{
    CallContext, CallError, MockService, ResponseStream, SimpleRequest, SimpleResponse,
    StreamRequest, StreamResponse, grpc_outbound, methods,
};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::{Instrument, info, info_span, warn};

use crate::metrics::{STREAM_CALL_DURATION_SECONDS, STREAM_CALL_ERRORS_TOTAL, STREAM_CALLS_TOTAL};

/// Response items buffered between a streaming call and its response body.
const RESPONSE_BUFFER: usize = 32;

/// The four call shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallMethod {
    /// Unary.
    Echo,
    /// One request, many responses.
    ServerStream,
    /// Many requests, one response.
    ClientStream,
    /// Many requests, one response per request.
    BidiStream,
}

impl CallMethod {
    /// Method name within `mock.MockService`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Echo => methods::ECHO,
            Self::ServerStream => methods::SERVER_STREAM,
            Self::ClientStream => methods::CLIENT_STREAM,
            Self::BidiStream => methods::BIDI_STREAM,
        }
    }
}

/// Context for a new call: cancelled with `shutdown`, bounded by `timeout`.
pub fn call_context(shutdown: &CancellationToken, timeout: Option<Duration>) -> CallContext {
    let ctx = CallContext::new(shutdown);
    match timeout {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    }
}

/// Generated-server adapter around [`MockService`].
#[derive(Clone, Debug)]
pub struct GrpcMockService {
    service: MockService,
    shutdown: CancellationToken,
    call_timeout: Option<Duration>,
}

impl GrpcMockService {
    /// Adapter whose calls end with `shutdown` or after `call_timeout`.
    pub fn new(
        service: MockService,
        shutdown: CancellationToken,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            service,
            shutdown,
            call_timeout,
        }
    }

    /// Wrap in the generated tonic server.
    pub fn into_server(self, max_message_size: usize) -> MockServiceServer<Self> {
        MockServiceServer::new(self)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size)
    }

    fn context(&self) -> CallContext {
        call_context(&self.shutdown, self.call_timeout)
    }
}

/// Run `call` inside a span for `method`, counting it and recording how it
/// ended.
async fn observed<T, F>(method: CallMethod, call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, CallError>>,
{
    counter!(STREAM_CALLS_TOTAL, "method" => method.name()).increment(1);
    let started = Instant::now();
    let span = info_span!("call", method = method.name());
    let outcome = call.instrument(span.clone()).await;

    let elapsed = started.elapsed();
    histogram!(STREAM_CALL_DURATION_SECONDS, "method" => method.name())
        .record(elapsed.as_secs_f64());
    span.in_scope(|| match &outcome {
        Ok(_) => info!(elapsed_secs = elapsed.as_secs_f64(), "call completed"),
        Err(e) => {
            counter!(STREAM_CALL_ERRORS_TOTAL, "method" => method.name(), "code" => e.code().as_str())
                .increment(1);
            warn!(code = e.code().as_str(), error = %e, "call failed");
        }
    });
    outcome
}

#[tonic::async_trait]
impl mock_service_server::MockService for GrpcMockService {
    async fn echo(
        &self,
        request: Request<SimpleRequest>,
    ) -> Result<Response<SimpleResponse>, Status> {
        let ctx = self.context();
        observed(CallMethod::Echo, self.service.echo(&ctx, request.into_inner()))
            .await
            .map(Response::new)
            .map_err(Status::from)
    }

    type ServerStreamStream = ResponseStream<StreamResponse>;

    async fn server_stream(
        &self,
        request: Request<StreamRequest>,
    ) -> Result<Response<Self::ServerStreamStream>, Status> {
        let ctx = self.context();
        let service = self.service.clone();
        let request = request.into_inner();
        let (outbound, stream) = grpc_outbound(RESPONSE_BUFFER);
        let _task = tokio::spawn(async move {
            let outcome = observed(CallMethod::ServerStream, async {
                service.server_stream(&ctx, request, &outbound).await
            })
            .await;
            if let Err(e) = outcome {
                outbound.fail(e).await;
            }
        });
        Ok(Response::new(stream))
    }

    async fn client_stream(
        &self,
        request: Request<Streaming<StreamRequest>>,
    ) -> Result<Response<SimpleResponse>, Status> {
        let ctx = self.context();
        let mut inbound = request.into_inner();
        observed(
            CallMethod::ClientStream,
            self.service.client_stream(&ctx, &mut inbound),
        )
        .await
        .map(Response::new)
        .map_err(Status::from)
    }

    type BidiStreamStream = ResponseStream<StreamResponse>;

    async fn bidi_stream(
        &self,
        request: Request<Streaming<StreamRequest>>,
    ) -> Result<Response<Self::BidiStreamStream>, Status> {
        let ctx = self.context();
        let service = self.service.clone();
        let inbound = request.into_inner();
        let (outbound, stream) = grpc_outbound(RESPONSE_BUFFER);
        let _task = tokio::spawn(async move {
            let outcome = observed(CallMethod::BidiStream, async {
                service.bidi_stream(&ctx, inbound, &outbound).await
            })
            .await;
            if let Err(e) = outcome {
                outbound.fail(e).await;
            }
        });
        Ok(Response::new(stream))
    }
}
