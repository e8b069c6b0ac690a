//! Failure taxonomy shared by every part of a relayed call.

/// Everything that can go wrong while relaying a call.
///
/// Only `ProtocolViolation` is recoverable: the offending frame is logged and
/// dropped. Every other variant ends the call by closing both sockets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The signed-URL endpoint (or the AI socket handshake) failed or timed out.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// The signed-URL endpoint answered, but not with a usable URL.
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),
    /// A WebSocket reported a transport error.
    #[error("Socket error: {0}")]
    SocketError(String),
    /// A frame could not be decoded or carried an unknown tag.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
}

impl RelayError {
    /// Whether this error terminates the call.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RelayError::ProtocolViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_display() {
        let err = RelayError::UpstreamUnavailable("status 503".to_string());
        assert_eq!(format!("{}", err), "Upstream unavailable: status 503");

        let err = RelayError::ProtocolViolation("unknown tag".to_string());
        assert_eq!(format!("{}", err), "Protocol violation: unknown tag");
    }

    #[test]
    fn test_only_protocol_violations_are_recoverable() {
        assert!(RelayError::UpstreamUnavailable(String::new()).is_fatal());
        assert!(RelayError::MalformedResponse(String::new()).is_fatal());
        assert!(RelayError::SocketError(String::new()).is_fatal());
        assert!(!RelayError::ProtocolViolation(String::new()).is_fatal());
    }
}
