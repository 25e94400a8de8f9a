//! Per-call cancellation and deadline.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CallError;

/// Cancellation scope of one call.
///
/// Cancelled explicitly through its token (server shutdown cancels the parent)
/// or implicitly when the optional deadline passes.
#[derive(Clone, Debug)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context cancelled together with `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            deadline: None,
        }
    }

    /// Free-standing context with its own token.
    pub fn detached() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this call (and nothing above it).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token for deriving sub-scopes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the call is over, if it is.
    pub fn err(&self) -> Option<CallError> {
        if self.token.is_cancelled() {
            return Some(CallError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CallError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolve once the call is cancelled or its deadline passes.
    pub async fn done(&self) -> CallError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => CallError::Cancelled,
                () = tokio::time::sleep_until(deadline) => CallError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CallError::Cancelled
            }
        }
    }
}
