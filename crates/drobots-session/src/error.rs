//! Error types for the session layer.

use drobots_rpc::RpcError;

use crate::SessionState;

/// Errors that can occur while running a client session.
///
/// Startup and login failures are fatal to the process. `CapacityExceeded`
/// and `SessionInactive` are per-request rejections: they go back to the
/// coordinator as remote errors and the session keeps running.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Required configuration is missing or malformed, or the callback
    /// endpoint could not be bound. Detected before any network call to
    /// the coordinator.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The coordinator could not be reached, or the object at the
    /// configured address is not a game coordinator.
    #[error("coordinator {address} unreachable: {source}")]
    UnreachableCoordinator {
        address: String,
        #[source]
        source: RpcError,
    },

    /// The coordinator declined the login. The reason is opaque.
    #[error("login rejected: {reason}")]
    LoginRejected { reason: String },

    /// A transport failure or timeout while talking to the coordinator.
    #[error("communication failure: {0}")]
    Communication(#[source] RpcError),

    /// The session already owns the maximum number of units.
    #[error("unit capacity of {max} exceeded")]
    CapacityExceeded { max: usize },

    /// A unit was requested before the session was logged in.
    #[error("session is not active")]
    SessionInactive,

    /// An operation was called in a state that does not allow it.
    #[error("{operation} not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl SessionError {
    /// Short category name, used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::UnreachableCoordinator { .. } => "UnreachableCoordinatorError",
            Self::LoginRejected { .. } => "LoginRejectedError",
            Self::Communication(_) => "CommunicationError",
            Self::CapacityExceeded { .. } => "CapacityExceededError",
            Self::SessionInactive => "SessionInactive",
            Self::InvalidState { .. } => "InvalidState",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_each_variant() {
        assert_eq!(
            SessionError::Configuration("x".into()).category(),
            "ConfigurationError"
        );
        assert_eq!(
            SessionError::Communication(RpcError::ConnectionLost).category(),
            "CommunicationError"
        );
        assert_eq!(
            SessionError::CapacityExceeded { max: 4 }.category(),
            "CapacityExceededError"
        );
    }

    #[test]
    fn test_invalid_state_message_names_operation_and_state() {
        let err = SessionError::InvalidState {
            operation: "login",
            state: SessionState::Active,
        };
        assert_eq!(err.to_string(), "login not allowed while active");
    }

    #[test]
    fn test_unreachable_keeps_rpc_source() {
        use std::error::Error;

        let err = SessionError::UnreachableCoordinator {
            address: "game@ws://127.0.0.1:1".into(),
            source: RpcError::ConnectionLost,
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("game@ws://127.0.0.1:1"));
    }
}
