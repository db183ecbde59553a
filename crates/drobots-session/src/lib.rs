//! Client session lifecycle for drobots.
//!
//! This crate is the core of the client. It takes a configuration and:
//!
//! 1. **Bootstraps**: checks the coordinator, binds the callback endpoint
//!    and registers the [`PlayerHandler`] ([`SessionManager::bootstrap`])
//! 2. **Logs in**, handing the coordinator the player reference
//!    ([`SessionManager::login`])
//! 3. **Serves** the coordinator's callbacks: unit requests become
//!    [`UnitController`] servants, at most `max_units` of them
//! 4. **Waits** for the match outcome or a local interrupt
//!    ([`SessionManager::await_termination`]), then tears down
//!
//! # How it fits in the stack
//!
//! ```text
//! Client binary (above)  ← config, logging, interrupt, exit code
//!     ↕
//! Session Layer (this crate)  ← session state, player and unit servants
//!     ↕
//! RPC Layer (below)  ← ObjectAdapter, Communicator, Proxy
//! ```

mod config;
mod error;
mod manager;
mod player;
mod session;
mod unit;

pub use config::{ClientConfig, Configuration, DEFAULT_LOGIN_TIMEOUT, DEFAULT_MAX_UNITS};
pub use error::SessionError;
pub use manager::{EXTERNAL_INTERRUPT, SessionManager};
pub use player::PlayerHandler;
pub use session::SessionState;
pub use unit::UnitController;
