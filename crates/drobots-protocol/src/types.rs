//! Core protocol types for the drobots wire format.
//!
//! Every call between the client and the game coordinator is an object
//! invocation: a request addressed to an [`Identity`] hosted on some
//! endpoint, answered by exactly one reply carrying the same [`CallId`].
//! This module defines those structures; the RPC layer moves them around.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Type ids
// ---------------------------------------------------------------------------

/// Type id the coordinator must answer `IsA` for.
pub const GAME_TYPE_ID: &str = "::drobots::Game";
/// Type id of the player callback object.
pub const PLAYER_TYPE_ID: &str = "::drobots::Player";
/// Type id of a unit (robot) controller callback object.
pub const ROBOT_CONTROLLER_TYPE_ID: &str = "::drobots::RobotController";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The name of an object within one adapter.
///
/// Generated identities are 32 lowercase hex characters; well-known ones
/// (such as the coordinator's `game`) are chosen by whoever hosts them.
/// An identity is never empty and never contains `@` or whitespace, so it
/// can always be embedded in an [`ObjectRef`] string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validates and wraps an identity string.
    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        if name.is_empty()
            || name.contains('@')
            || name.chars().any(char::is_whitespace)
        {
            return Err(ProtocolError::InvalidIdentity(name));
        }
        Ok(Self(name))
    }

    /// Renders 16 bytes as a 32-character lowercase hex identity.
    ///
    /// Always valid, so it needs no error path. Callers supply random
    /// bytes to get a process-unique identity.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to a remote object: `identity@ws://host:port`.
///
/// This is what travels on the wire when one side hands the other an
/// object to call back (the player reference in `Login`, a unit reference
/// in a `CreateUnit` reply), and what the configuration uses to name the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectRef {
    identity: Identity,
    endpoint: String,
}

impl ObjectRef {
    /// Builds a reference from an identity and a `ws://` endpoint.
    pub fn new(
        identity: Identity,
        endpoint: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        Ok(Self { identity, endpoint })
    }

    /// Builds a reference to an object on an adapter listening at `addr`.
    pub fn for_socket_addr(identity: Identity, addr: SocketAddr) -> Self {
        Self {
            identity,
            endpoint: format!("ws://{addr}"),
        }
    }

    /// The object's identity on its adapter.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The adapter endpoint, e.g. `ws://127.0.0.1:10000`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ProtocolError> {
    let rest = endpoint
        .strip_prefix("ws://")
        .or_else(|| endpoint.strip_prefix("wss://"));
    match rest {
        Some(authority)
            if !authority.is_empty()
                && !authority.chars().any(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ProtocolError::InvalidObjectRef(endpoint.to_string())),
    }
}

impl FromStr for ObjectRef {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (identity, endpoint) = s
            .split_once('@')
            .ok_or_else(|| ProtocolError::InvalidObjectRef(s.to_string()))?;
        let identity = Identity::new(identity)
            .map_err(|_| ProtocolError::InvalidObjectRef(s.to_string()))?;
        validate_endpoint(endpoint)
            .map_err(|_| ProtocolError::InvalidObjectRef(s.to_string()))?;
        Ok(Self {
            identity,
            endpoint: endpoint.to_string(),
        })
    }
}

impl TryFrom<String> for ObjectRef {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectRef> for String {
    fn from(obj: ObjectRef) -> Self {
        obj.to_string()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.endpoint)
    }
}

/// Correlates a reply with the request that caused it.
///
/// Allocated by the caller, unique per outgoing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// The coordinator's key for one unit-creation request.
///
/// Duplicate deliveries of the same request carry the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitRequestId(pub String);

impl fmt::Display for UnitRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitRequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Match outcome
// ---------------------------------------------------------------------------

/// How a match ended for this player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchOutcome {
    Win,
    Lose,
    /// The match stopped without a result.
    Aborted { reason: String },
}

impl MatchOutcome {
    /// Shorthand for an [`Aborted`](Self::Aborted) outcome.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win => write!(f, "win"),
            Self::Lose => write!(f, "lose"),
            Self::Aborted { reason } => write!(f, "aborted ({reason})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calls and replies
// ---------------------------------------------------------------------------

/// An operation invoked on a remote object.
///
/// Which operations an object accepts depends on its type: the
/// coordinator takes `Login`, a player takes `CreateUnit` and
/// `ReportOutcome`, a unit controller takes `Turn` and `UnitDestroyed`.
/// Every object answers `IsA`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Call {
    /// Capability check: does the target implement `type_id`?
    IsA { type_id: String },

    /// Player → coordinator: admit `player` under display name `name`.
    Login { player: ObjectRef, name: String },

    /// Coordinator → player: create (or return) the unit for `request_id`.
    CreateUnit { request_id: UnitRequestId },

    /// Coordinator → player: the match is over.
    ReportOutcome { outcome: MatchOutcome },

    /// Coordinator → unit: it is this unit's turn.
    Turn,

    /// Coordinator → unit: this unit has been destroyed.
    UnitDestroyed,
}

impl Call {
    /// Operation name, for logs and `OperationNotExist` errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsA { .. } => "IsA",
            Self::Login { .. } => "Login",
            Self::CreateUnit { .. } => "CreateUnit",
            Self::ReportOutcome { .. } => "ReportOutcome",
            Self::Turn => "Turn",
            Self::UnitDestroyed => "UnitDestroyed",
        }
    }
}

/// The successful result of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ReplyValue {
    /// No return value.
    Unit,
    Bool(bool),
    Object(ObjectRef),
}

/// A failure reported by the remote side of a call.
///
/// These are application-level answers ("no such object", "login
/// refused"); transport failures never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type")]
pub enum RemoteError {
    #[error("object {identity} does not exist")]
    ObjectNotExist { identity: Identity },

    #[error("operation {operation} not supported by {type_id}")]
    OperationNotExist { operation: String, type_id: String },

    #[error("login rejected: {reason}")]
    LoginRejected { reason: String },

    #[error("unit capacity of {max} exceeded")]
    CapacityExceeded { max: usize },

    #[error("session is not active")]
    SessionInactive,

    #[error("{message}")]
    Unknown { message: String },
}

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// What an envelope carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Payload {
    /// Invoke `call` on the object named `target` at the receiving adapter.
    Request { target: Identity, call: Call },

    /// The answer to the request with the same call id.
    Reply { result: Result<ReplyValue, RemoteError> },
}

/// Every message on the wire is an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub call_id: CallId,
    pub payload: Payload,
}

impl Envelope {
    /// Builds a request envelope.
    pub fn request(call_id: CallId, target: Identity, call: Call) -> Self {
        Self {
            call_id,
            payload: Payload::Request { target, call },
        }
    }

    /// Builds a reply envelope.
    pub fn reply(
        call_id: CallId,
        result: Result<ReplyValue, RemoteError>,
    ) -> Self {
        Self {
            call_id,
            payload: Payload::Reply { result },
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
