//! Error types for the RPC layer.

use std::time::Duration;

use drobots_protocol::{Identity, ObjectRef, ProtocolError, RemoteError};
use drobots_transport::TransportError;

/// Errors that can occur while hosting objects or invoking remote ones.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The underlying connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The remote side answered the call with an error.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// No reply arrived within the proxy's timeout.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The connection closed while a call was waiting for its reply.
    #[error("connection lost before reply")]
    ConnectionLost,

    /// A servant is already registered under this identity.
    #[error("identity {0} is already registered")]
    AlreadyRegistered(Identity),

    /// The adapter has been deactivated and accepts no more work.
    #[error("object adapter is deactivated")]
    Deactivated,

    /// The target object does not implement the requested type.
    #[error("{target} is not a {type_id}")]
    NotA { target: ObjectRef, type_id: String },

    /// The reply had a shape the caller did not expect.
    #[error("unexpected reply to {operation}")]
    UnexpectedReply { operation: &'static str },
}
