//! Fan-out of one envelope to a registry snapshot.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use mockwire_core::{Clock, ConnectionId, Envelope, EnvelopeError};
use tracing::{debug, warn};

use super::registry::Snapshot;
use crate::metrics::{BROADCAST_DELIVERIES_TOTAL, BROADCAST_FAILURES_TOTAL};

/// Result of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients in the snapshot.
    pub attempted: usize,
    /// Recipients whose write succeeded.
    pub delivered: usize,
    /// Recipients whose write failed or timed out.
    pub failed: Vec<ConnectionId>,
}

/// Sends one envelope to every connection in a snapshot.
///
/// Recipients are written concurrently, each bounded by its own write
/// deadline. A failed recipient is logged and counted but stays registered;
/// its own read loop notices the broken transport and cleans up.
#[derive(Clone, Debug)]
pub struct BroadcastEngine {
    clock: Arc<dyn Clock>,
}

impl BroadcastEngine {
    /// Engine stamping with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Stamp, encode once, and write to every recipient.
    ///
    /// Only an encode failure is an error; per-recipient failures are in the
    /// report.
    pub async fn deliver(
        &self,
        mut envelope: Envelope,
        snapshot: &Snapshot,
    ) -> Result<DeliveryReport, EnvelopeError> {
        envelope.stamp(self.clock.now());
        let text = envelope.encode()?;

        let sends = snapshot.iter().map(|conn| {
            let text = text.clone();
            async move { (conn.id(), conn.send(text).await) }
        });
        let results = join_all(sends).await;

        let mut report = DeliveryReport {
            attempted: results.len(),
            ..DeliveryReport::default()
        };
        for (conn_id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(%conn_id, kind = %envelope.kind, error = %e, "failed to deliver to recipient");
                    report.failed.push(conn_id);
                }
            }
        }

        counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        if !report.failed.is_empty() {
            counter!(BROADCAST_FAILURES_TOTAL).increment(report.failed.len() as u64);
        }
        debug!(
            kind = %envelope.kind,
            room = envelope.audience.as_deref().unwrap_or(""),
            attempted = report.attempted,
            delivered = report.delivered,
            "fan-out complete"
        );
        Ok(report)
    }
}
