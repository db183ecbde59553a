//! Error types for the protocol layer.
//!
//! A `ProtocolError` means a message or a reference could not be turned
//! into (or out of) its wire form. It never describes a network failure.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, unknown
    /// operation tags, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An identity was empty or contained `@` or whitespace.
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),

    /// An object reference was not of the form `identity@ws://host:port`.
    #[error("invalid object reference: {0:?}")]
    InvalidObjectRef(String),

    /// The message decoded but makes no sense at this point of the
    /// protocol (e.g. a request arriving on a reply-only connection).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
