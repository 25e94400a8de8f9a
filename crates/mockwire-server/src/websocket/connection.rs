//! One accepted persistent-session connection.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use mockwire_core::ConnectionId;
use parking_lot::Mutex;
use tracing::debug;

use super::transport::{FrameSink, TransportError};

/// Which audience, if any, a connection currently belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Membership {
    /// Not registered anywhere.
    #[default]
    None,
    /// Registered in a global set only.
    Global,
    /// Member of the named audience.
    Audience(String),
}

/// Write handle for one connection plus its bookkeeping.
///
/// Writes are serialized through an async mutex and each one is bounded by the
/// connection's write deadline. A write abandoned at the deadline is reported
/// as [`TransportError::WriteTimeout`] and leaves the connection usable.
pub struct Connection {
    id: ConnectionId,
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,
    write_deadline_ms: AtomicU64,
    closed: AtomicBool,
    membership: Mutex<Membership>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("write_deadline", &self.write_deadline())
            .field("closed", &self.is_closed())
            .field("membership", &*self.membership.lock())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap `sink` with a fresh id.
    pub fn new(sink: impl FrameSink + 'static, write_deadline: Duration) -> Self {
        Self {
            id: ConnectionId::new(),
            sink: tokio::sync::Mutex::new(Box::new(sink)),
            write_deadline_ms: AtomicU64::new(duration_ms(write_deadline)),
            closed: AtomicBool::new(false),
            membership: Mutex::new(Membership::None),
        }
    }

    /// Registry key.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Deadline applied to each subsequent write.
    pub fn set_write_deadline(&self, deadline: Duration) {
        self.write_deadline_ms
            .store(duration_ms(deadline), Ordering::Relaxed);
    }

    /// Current per-write deadline.
    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms.load(Ordering::Relaxed))
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current membership.
    pub fn membership(&self) -> Membership {
        self.membership.lock().clone()
    }

    pub(crate) fn set_membership(&self, membership: Membership) {
        *self.membership.lock() = membership;
    }

    /// Write one text frame within the write deadline.
    pub async fn send(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let deadline = self.write_deadline();
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send_text(text).await
        };
        tokio::time::timeout(deadline, write)
            .await
            .unwrap_or(Err(TransportError::WriteTimeout(deadline)))
    }

    /// Close the transport. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let deadline = self.write_deadline();
        let close = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(deadline, close).await {
            Ok(Ok(())) => debug!(conn_id = %self.id, "connection closed"),
            Ok(Err(e)) => debug!(conn_id = %self.id, error = %e, "close frame not sent"),
            Err(_) => debug!(conn_id = %self.id, "close timed out"),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
