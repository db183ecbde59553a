//! Unified error type for the drobots client.

use drobots_protocol::ProtocolError;
use drobots_rpc::RpcError;
use drobots_session::SessionError;
use drobots_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DrobotsError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed reference).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An invocation error (timeout, remote error, lost connection).
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A session-level error (configuration, login, capacity).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl DrobotsError {
    /// Short category name, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TransportError",
            Self::Protocol(_) => "ProtocolError",
            Self::Rpc(_) => "CommunicationError",
            Self::Session(e) => e.category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::AcceptFailed(std::io::Error::other("gone"));
        let drobots_err: DrobotsError = err.into();
        assert!(matches!(drobots_err, DrobotsError::Transport(_)));
        assert!(drobots_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidObjectRef("bad".into());
        let drobots_err: DrobotsError = err.into();
        assert!(matches!(drobots_err, DrobotsError::Protocol(_)));
    }

    #[test]
    fn test_from_rpc_error() {
        let drobots_err: DrobotsError = RpcError::ConnectionLost.into();
        assert!(matches!(drobots_err, DrobotsError::Rpc(_)));
        assert_eq!(drobots_err.category(), "CommunicationError");
    }

    #[test]
    fn test_from_session_error_keeps_category() {
        let err = SessionError::LoginRejected {
            reason: "match full".into(),
        };
        let drobots_err: DrobotsError = err.into();
        assert!(matches!(drobots_err, DrobotsError::Session(_)));
        assert_eq!(drobots_err.category(), "LoginRejectedError");
        assert!(drobots_err.to_string().contains("match full"));
    }
}
