// Typed request errors carried in outcomes instead of being raised.
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Handshake or bind failure; fatal to the connection.
    Connect,
    /// No terminal event before the deadline.
    Timeout,
    /// Stream or connection reset by the transport.
    Transport,
    /// Malformed event sequence, e.g. data after the stream completed.
    ProtocolViolation,
    /// Header bytes that are not valid text.
    Decode,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Transport)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
            ErrorKind::ProtocolViolation => "protocol_violation",
            ErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error kind plus a human-readable message.
///
/// ```
/// use strand_client::{ErrorKind, RequestError};
/// use std::time::Duration;
///
/// let err = RequestError::timeout(Duration::from_millis(250));
/// assert_eq!(err.kind, ErrorKind::Timeout);
/// assert!(err.kind.is_retryable());
/// assert_eq!(err.to_string(), "timeout: no response within 250ms");
/// ```
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("no response within {}ms", after.as_millis()),
        )
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }
}

impl From<strand_transport::ConnectError> for RequestError {
    fn from(err: strand_transport::ConnectError) -> Self {
        Self::new(ErrorKind::Connect, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeout_and_transport_retry() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Transport.is_retryable());
        assert!(!ErrorKind::Connect.is_retryable());
        assert!(!ErrorKind::ProtocolViolation.is_retryable());
        assert!(!ErrorKind::Decode.is_retryable());
    }

    #[test]
    fn connect_errors_map_to_connect_kind() {
        let err: RequestError =
            strand_transport::ConnectError::NoAddress("example.invalid".into()).into();
        assert_eq!(err.kind, ErrorKind::Connect);
        assert!(err.message.contains("example.invalid"));
    }
}
