//! Duplex call coordinator.
//!
//! One call runs two flows over the same pair of halves:
//!
//! - the **receive flow** reads request items, numbers each response from the
//!   shared sequence counter and queues it
//! - the **write flow** is the only code that touches the outbound half; it
//!   drains the queue in order
//!
//! The call ends when the receive flow ends and the queue is drained. Whichever
//! flow fails first records the call's error and aborts the other; later
//! errors are dropped. Both flows also watch the call context, so cancellation
//! or an expired deadline stops them even while they are blocked.

use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::context::CallContext;
use crate::error::CallError;
use crate::stream::{Inbound, Outbound};

/// Responses buffered between the receive and write flows.
const RESPONSE_QUEUE_DEPTH: usize = 32;

/// Shared state of one duplex call.
#[derive(Debug)]
pub struct StreamSession {
    ctx: CallContext,
    sequence: AtomicI32,
    first_error: Mutex<Option<CallError>>,
    abort: CancellationToken,
}

impl StreamSession {
    /// Session scoped to `ctx`.
    pub fn new(ctx: &CallContext) -> Self {
        Self {
            ctx: ctx.clone(),
            sequence: AtomicI32::new(0),
            first_error: Mutex::new(None),
            abort: ctx.token().child_token(),
        }
    }

    /// Claim the next sequence number. The first call returns 1.
    ///
    /// The counter never wraps: once `i32::MAX` has been handed out every
    /// later claim fails with [`CallError::Internal`].
    pub fn next_sequence(&self) -> Result<i32, CallError> {
        self.sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|prev| prev + 1)
            .map_err(|_| CallError::Internal("sequence overflow".into()))
    }

    /// Last sequence number handed out (0 before any).
    pub fn sequence(&self) -> i32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Record `err` unless an earlier error is already recorded, then abort
    /// both flows.
    pub fn fail(&self, err: CallError) {
        {
            let mut slot = self.first_error.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.abort.cancel();
    }

    /// The recorded error, if any.
    pub fn error(&self) -> Option<CallError> {
        self.first_error.lock().clone()
    }

    /// Resolve when the context ends or a flow has failed.
    async fn interrupted(&self) -> CallError {
        tokio::select! {
            biased;
            err = self.ctx.done() => err,
            () = self.abort.cancelled() => CallError::Cancelled,
        }
    }
}

/// Counts from a completed duplex call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BidiOutcome {
    /// Request items read before half-close.
    pub received: u32,
    /// Responses written.
    pub sent: u32,
}

/// Run one duplex call to completion.
///
/// `respond` maps each request to its response given the request's sequence
/// number (1, 2, ...). Returns the first error either flow hit.
#[instrument(skip_all, name = "bidi_call")]
pub async fn run_bidi<Req, Resp, I, O, F>(
    ctx: &CallContext,
    mut inbound: I,
    outbound: &O,
    mut respond: F,
) -> Result<BidiOutcome, CallError>
where
    Req: Send,
    Resp: Send,
    I: Inbound<Req>,
    O: Outbound<Resp> + ?Sized,
    F: FnMut(Req, i32) -> Resp + Send,
{
    let session = StreamSession::new(ctx);
    let (queue_tx, queue_rx) = mpsc::channel::<Resp>(RESPONSE_QUEUE_DEPTH);

    let receive = async {
        let queue_tx = queue_tx;
        let mut received = 0_u32;
        loop {
            let next = tokio::select! {
                biased;
                err = session.interrupted() => {
                    session.fail(err);
                    break;
                }
                next = inbound.recv() => next,
            };
            match next {
                Ok(Some(request)) => {
                    received += 1;
                    let sequence = match session.next_sequence() {
                        Ok(sequence) => sequence,
                        Err(e) => {
                            session.fail(e);
                            break;
                        }
                    };
                    let response = respond(request, sequence);
                    debug!(sequence, "response queued");
                    if queue_tx.send(response).await.is_err() {
                        // write flow is gone and has recorded why
                        break;
                    }
                }
                Ok(None) => {
                    debug!(received, "caller half-closed");
                    break;
                }
                Err(e) => {
                    session.fail(e);
                    break;
                }
            }
        }
        received
    };

    let write = async {
        let mut queue_rx = queue_rx;
        let mut sent = 0_u32;
        while let Some(response) = queue_rx.recv().await {
            let result = tokio::select! {
                biased;
                err = session.interrupted() => Err(err),
                result = outbound.send(response) => result,
            };
            if let Err(e) = result {
                session.fail(e);
                break;
            }
            sent += 1;
        }
        sent
    };

    let (received, sent) = tokio::join!(receive, write);

    match session.error() {
        Some(err) => {
            warn!(error = %err, received, sent, "duplex call failed");
            Err(err)
        }
        None => {
            debug!(received, sent, "duplex call completed");
            Ok(BidiOutcome { received, sent })
        }
    }
}
