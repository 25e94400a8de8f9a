//! Envelope error types.

use thiserror::Error;

/// Failure to put an envelope on the wire.
///
/// Fatal for the single send that produced it; the connection itself stays up.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The envelope has no `timestamp`; every outgoing envelope is stamped at send time.
    #[error("envelope of kind '{0}' was not stamped before encoding")]
    Unstamped(String),
    /// JSON serialization failed.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}
