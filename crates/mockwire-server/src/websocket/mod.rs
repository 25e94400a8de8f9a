//! Persistent sessions: transport, connections, membership, fan-out and the
//! per-connection lifecycle.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
pub mod transport;

pub use broadcast::{BroadcastEngine, DeliveryReport};
pub use connection::{Connection, Membership};
pub use registry::{ConnectionRegistry, Snapshot};
pub use session::{Scope, Session, SessionState};
pub use transport::{FrameSink, FrameSource, TransportError};
