//! Object invocation layer for the drobots client.
//!
//! The coordinator and the client talk in terms of *objects*: each side
//! hosts objects on an adapter, hands out [`ObjectRef`]s to them, and
//! calls the other side's objects through proxies.
//!
//! - [`ObjectAdapter`] — the inbound side. Listens on an endpoint,
//!   accepts connections once activated, and dispatches every request to
//!   the [`Servant`] registered under the target identity, one task per
//!   request.
//! - [`Communicator`] / [`Proxy`] — the outbound side. Dials endpoints,
//!   sends requests and matches replies back to callers by call id.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → RPC (this crate) → Session
//! ```
//!
//! [`ObjectRef`]: drobots_protocol::ObjectRef

mod adapter;
mod error;
mod proxy;
mod servant;

pub use adapter::{ObjectAdapter, generate_identity};
pub use error::RpcError;
pub use proxy::{Communicator, DEFAULT_INVOCATION_TIMEOUT, Proxy};
pub use servant::{BoxFuture, Servant};
