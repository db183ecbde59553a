//! Wire protocol for the drobots client.
//!
//! - **Types** ([`Envelope`], [`Call`], [`ObjectRef`], …) — the
//!   structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those structures
//!   become bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing so.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → RPC (servants, proxies)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Call, CallId, Envelope, GAME_TYPE_ID, Identity, MatchOutcome, ObjectRef,
    PLAYER_TYPE_ID, Payload, ROBOT_CONTROLLER_TYPE_ID, RemoteError,
    ReplyValue, UnitRequestId,
};
