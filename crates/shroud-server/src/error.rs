//! Server error types.

use std::fmt;

use shroud_core::ChannelError;

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// These are fatal errors that prevent server startup. Fix configuration
    /// and restart.
    Config(String),

    /// Transport/network error (accept failure, socket I/O error, etc.).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    Transport(String),

    /// Protocol error (malformed packet header, oversized frame).
    ///
    /// Indicates a client sent malformed data. Fatal for that connection,
    /// but server can continue serving other clients.
    Protocol(String),

    /// Internal error (unexpected state, logic bug, etc.).
    ///
    /// Should never happen in correct implementation. Indicates a bug.
    Internal(String),

    /// Secure channel error from the driver.
    ///
    /// Returned by handle operations such as sending before the key exchange
    /// finished. See `ChannelError` for details.
    Channel(ChannelError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Channel(err) => write!(f, "channel error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChannelError> for ServerError {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

impl From<shroud_proto::ProtocolError> for ServerError {
    fn from(err: shroud_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<shroud_proto::StreamError> for ServerError {
    fn from(err: shroud_proto::StreamError) -> Self {
        match err {
            shroud_proto::StreamError::Protocol(e) => e.into(),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = ServerError::Config("invalid bind address".to_string());
        assert_eq!(err.to_string(), "configuration error: invalid bind address");

        let err = ServerError::Channel(ChannelError::UnresolvedSession);
        assert_eq!(err.to_string(), "channel error: no resolved peer key for this session");
    }

    #[test]
    fn stream_errors_split_by_cause() {
        let truncated = shroud_proto::StreamError::TruncatedHeader { received: 2, expected: 5 };
        assert!(matches!(ServerError::from(truncated), ServerError::Transport(_)));

        let oversized = shroud_proto::StreamError::Protocol(shroud_proto::ProtocolError::LengthTooLarge {
            len: 100,
            max: 10,
        });
        assert!(matches!(ServerError::from(oversized), ServerError::Protocol(_)));
    }

    #[test]
    fn channel_error_is_source() {
        use std::error::Error;

        let err = ServerError::from(ChannelError::KeyRebind);
        assert!(err.source().is_some());
        assert!(ServerError::Internal("bug".to_string()).source().is_none());
    }
}
