//! Server startup errors.

use std::net::SocketAddr;

use thiserror::Error;

/// Failure to bring the listeners up.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Other socket error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The reflection service could not load the descriptor set.
    #[error("grpc reflection: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
    /// Configuration could not be resolved.
    #[error(transparent)]
    Settings(#[from] mockwire_settings::SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_the_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80: denied");
    }
}
