//! # drobots
//!
//! Participant client for the drobots robot-combat game.
//!
//! The client joins a match hosted by a remote game coordinator: it
//! registers a player object the coordinator calls back on, logs in, hands
//! out one unit controller per unit the coordinator asks for, and stops
//! when the coordinator reports the outcome (or the process is
//! interrupted).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drobots::prelude::*;
//!
//! # async fn example() -> Result<(), DrobotsError> {
//! let config = ClientConfig {
//!     game_proxy: Some("game@ws://127.0.0.1:10000".into()),
//!     adapter_endpoint: Some("127.0.0.1:0".into()),
//!     player_name: Some("rusty".into()),
//!     ..Default::default()
//! };
//! let outcome = drobots::run(&config, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! println!("match ended: {outcome}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub mod cli;
pub mod logging;

pub use client::run;
pub use error::DrobotsError;

/// Everything needed to run a client or host servants of your own.
pub mod prelude {
    pub use crate::{DrobotsError, run};
    pub use drobots_protocol::{
        Call, Identity, MatchOutcome, ObjectRef, RemoteError, ReplyValue, UnitRequestId,
        GAME_TYPE_ID, PLAYER_TYPE_ID, ROBOT_CONTROLLER_TYPE_ID,
    };
    pub use drobots_rpc::{BoxFuture, Communicator, ObjectAdapter, Proxy, RpcError, Servant};
    pub use drobots_session::{
        ClientConfig, Configuration, EXTERNAL_INTERRUPT, SessionError, SessionManager,
        SessionState,
    };
}
