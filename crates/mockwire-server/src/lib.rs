//! # mockwire-server
//!
//! Axum listeners for the mockwire protocol-test double.
//!
//! - **HTTP listener**: stateless responders (`/health`, `/echo`, `/delay`,
//!   `/status`, `/metrics`) and the persistent-session routes
//!   (`/ws/echo`, `/ws/broadcast`, `/ws/chat/{room}`)
//! - **Persistent sessions**: connection registry, broadcast engine and the
//!   per-connection lifecycle, behind a frame transport seam
//! - **Stream listener**: `mock.MockService` over gRPC (tonic), with server
//!   reflection
//! - Graceful shutdown through one `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod http;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, Listening, MockServer};
pub use shutdown::ShutdownCoordinator;
