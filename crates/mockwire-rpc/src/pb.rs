//! Generated `mock` protobuf messages, client and server.

#![allow(missing_docs, unused_results, clippy::all, clippy::pedantic)]

tonic::include_proto!("mock");

/// Encoded descriptor set of `mock.proto`, served through reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("mock_descriptor");
