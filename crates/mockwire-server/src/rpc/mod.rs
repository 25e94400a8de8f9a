//! gRPC binding of the mock call service.

pub mod grpc;

pub use grpc::{CallMethod, GrpcMockService, call_context};
