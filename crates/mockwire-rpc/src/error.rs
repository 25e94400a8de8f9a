//! Call outcomes.

use thiserror::Error;
use tonic::{Code, Status};

/// Terminal status of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Completed normally.
    Ok,
    /// Cancelled by the caller or by server shutdown.
    Cancelled,
    /// The call deadline passed.
    DeadlineExceeded,
    /// The caller sent something the service could not accept.
    InvalidArgument,
    /// The transport went away.
    Unavailable,
    /// Anything else.
    Internal,
}

impl StatusCode {
    /// `snake_case` name, used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::InvalidArgument => "invalid_argument",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }

    /// The gRPC code this status travels as.
    pub fn grpc(self) -> Code {
        match self {
            Self::Ok => Code::Ok,
            Self::Cancelled => Code::Cancelled,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::InvalidArgument => Code::InvalidArgument,
            Self::Unavailable => Code::Unavailable,
            Self::Internal => Code::Internal,
        }
    }
}

/// Reason a call ended unsuccessfully.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    /// The call context was cancelled.
    #[error("call cancelled")]
    Cancelled,
    /// The call deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// A request item was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The peer disconnected or a send failed.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Unexpected local failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CallError {
    /// Terminal status of a call that failed this way.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Cancelled => StatusCode::Cancelled,
            Self::DeadlineExceeded => StatusCode::DeadlineExceeded,
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::Unavailable(_) => StatusCode::Unavailable,
            Self::Internal(_) => StatusCode::Internal,
        }
    }
}

impl From<CallError> for Status {
    fn from(err: CallError) -> Self {
        let message = match &err {
            CallError::InvalidArgument(m) | CallError::Unavailable(m) | CallError::Internal(m) => {
                m.clone()
            }
            CallError::Cancelled | CallError::DeadlineExceeded => err.to_string(),
        };
        Status::new(err.code().grpc(), message)
    }
}

impl From<Status> for CallError {
    /// Read errors on a request stream. Codes with no local counterpart read
    /// as the caller having gone away.
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Cancelled => Self::Cancelled,
            Code::DeadlineExceeded => Self::DeadlineExceeded,
            Code::InvalidArgument => Self::InvalidArgument(status.message().to_owned()),
            Code::Internal => Self::Internal(status.message().to_owned()),
            _ => Self::Unavailable(status.message().to_owned()),
        }
    }
}
