//! # mockwire-core
//!
//! Shared vocabulary for the mockwire protocol-test double.
//!
//! - **Envelope**: the canonical message unit exchanged on every persistent
//!   session, with a total `decode` (never fails the connection) and a strict
//!   `encode`
//! - **Clock**: the `now()` seam used to stamp outgoing envelopes
//! - **Ids**: `ConnectionId` used as registry map keys
//! - **Logging**: `tracing` subscriber setup and in-memory log capture for tests

#![deny(unsafe_code)]

pub mod clock;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{Envelope, Frame, Inbound, Kind, Payload};
pub use errors::EnvelopeError;
pub use ids::ConnectionId;
pub use logging::LogFormat;
