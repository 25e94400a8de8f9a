//! # mockwire-rpc
//!
//! Streaming-call side of mockwire: the `mock.MockService` protobuf contract
//! and the service behind it.
//!
//! - **Pb**: messages, client and server generated from `proto/mock.proto`
//! - **Types**: request/response messages of the four call shapes
//! - **Context**: per-call cancellation token and deadline
//! - **Stream**: [`Inbound`]/[`Outbound`] halves, implemented over tonic
//!   streams and over channels
//! - **Coordinator**: [`run_bidi`] runs the receive and write flows of a duplex
//!   call and reconciles how it ends
//! - **Service**: [`MockService`] with `Echo`, `ServerStream`, `ClientStream`
//!   and `BidiStream`

#![deny(unsafe_code)]

pub mod context;
pub mod coordinator;
pub mod error;
pub mod pb;
pub mod service;
pub mod stream;
pub mod types;

pub use context::CallContext;
pub use coordinator::{BidiOutcome, StreamSession, run_bidi};
pub use error::{CallError, StatusCode};
pub use service::{MockService, methods};
pub use stream::{
    ChannelInbound, ChannelOutbound, GrpcOutbound, Inbound, Outbound, ResponseStream,
    grpc_outbound, inbound_channel, outbound_channel,
};
pub use types::{SimpleRequest, SimpleResponse, StreamRequest, StreamResponse};
