//! Server error types.

use thiserror::Error;

/// A frame could not be written to a session's transport.
///
/// Always ends the session, exactly like a client disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is gone; nothing more can be written.
    #[error("transport closed")]
    Closed,
    /// The write failed for another reason.
    #[error("transport write failed: {0}")]
    Write(String),
}

/// Errors that stop the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving on the listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "transport closed");
        assert_eq!(
            TransportError::Write("broken pipe".into()).to_string(),
            "transport write failed: broken pipe"
        );
    }

    #[test]
    fn server_error_from_io() {
        let err: ServerError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use").into();
        assert!(err.to_string().contains("in use"));
    }
}
