//! The session manager: drives one client session from start to finish.
//!
//! ```text
//! bootstrap() ──→ login() ──→ await_termination() ──→ teardown()
//!     │              │                 │
//!     │              │                 └─ parks until the player handler
//!     │              │                    records an outcome, or the
//!     │              │                    interrupt fires
//!     │              └─ Bootstrapping → AwaitingLogin → Active
//!     │                 (rolled back to Bootstrapping on failure)
//!     └─ validate config, check the coordinator, bind the callback
//!        endpoint, register the player handler, activate
//! ```
//!
//! The manager is an ordinary value constructed by `bootstrap` and passed
//! along by the caller. Nothing here is global.

use std::future::Future;
use std::sync::Arc;

use drobots_protocol::{Call, GAME_TYPE_ID, MatchOutcome, ObjectRef, RemoteError};
use drobots_rpc::{Communicator, ObjectAdapter, Proxy, RpcError, Servant};
use tokio::sync::{Mutex, oneshot};

use crate::session::{Session, SharedSession};
use crate::{ClientConfig, Configuration, PlayerHandler, SessionError, SessionState};

/// Reason recorded when the local interrupt ends the session.
pub const EXTERNAL_INTERRUPT: &str = "external-interrupt";

/// Owns the session, the callback endpoint and the coordinator proxy.
pub struct SessionManager {
    config: Configuration,
    session: SharedSession,
    adapter: Arc<ObjectAdapter>,
    communicator: Communicator,
    /// `None` once torn down.
    coordinator: Option<Proxy>,
    player: ObjectRef,
    /// Taken by the first `await_termination`.
    outcome_rx: Option<oneshot::Receiver<MatchOutcome>>,
    torn_down: bool,
}

impl SessionManager {
    /// Prepares a session: everything up to, but not including, login.
    ///
    /// When this returns the player handler is registered and the callback
    /// endpoint is dispatching.
    ///
    /// # Errors
    /// - [`SessionError::Configuration`] if the config is incomplete or
    ///   malformed (no network call is made), or the callback endpoint
    ///   cannot be bound
    /// - [`SessionError::UnreachableCoordinator`] if the coordinator cannot
    ///   be reached within the login timeout or is not a game coordinator
    pub async fn bootstrap(config: &ClientConfig) -> Result<Self, SessionError> {
        let config = config.validate()?;
        let communicator = Communicator::with_timeout(config.login_timeout);

        let coordinator = match resolve_coordinator(&communicator, &config).await {
            Ok(proxy) => proxy,
            Err(e) => {
                communicator.shutdown().await;
                return Err(e);
            }
        };

        let adapter = match ObjectAdapter::bind(&config.callback_binding).await {
            Ok(adapter) => Arc::new(adapter),
            Err(e) => {
                communicator.shutdown().await;
                return Err(SessionError::Configuration(format!(
                    "cannot bind callback endpoint {}: {e}",
                    config.callback_binding
                )));
            }
        };

        let (session, outcome_rx) = Session::new(config.max_units);
        let states = session.subscribe();
        let session = Arc::new(Mutex::new(session));
        let handler = PlayerHandler::new(
            Arc::clone(&session),
            Arc::downgrade(&adapter),
            states,
            config.login_timeout,
        );

        let registered = async {
            let player = adapter
                .add_with_uuid(Arc::new(handler) as Arc<dyn Servant>)
                .await?;
            adapter.activate().await?;
            Ok::<_, RpcError>(player)
        }
        .await;
        let player = match registered {
            Ok(player) => player,
            Err(e) => {
                adapter.deactivate().await;
                communicator.shutdown().await;
                return Err(SessionError::Communication(e));
            }
        };

        tracing::info!(
            coordinator = %config.coordinator,
            %player,
            "session bootstrapped"
        );

        Ok(Self {
            config,
            session,
            adapter,
            communicator,
            coordinator: Some(coordinator),
            player,
            outcome_rx: Some(outcome_rx),
            torn_down: false,
        })
    }

    /// Logs in to the coordinator as `player_name`, handing it the player
    /// handler's reference.
    ///
    /// Not retried. On failure the session is back in `Bootstrapping`.
    ///
    /// # Errors
    /// - [`SessionError::LoginRejected`] if the coordinator declined
    /// - [`SessionError::Communication`] on transport failure or timeout
    /// - [`SessionError::InvalidState`] unless the session is
    ///   `Bootstrapping`
    pub async fn login(&mut self, player_name: &str) -> Result<(), SessionError> {
        let Some(coordinator) = self.coordinator.clone() else {
            return Err(SessionError::InvalidState {
                operation: "login",
                state: self.state().await,
            });
        };
        self.session.lock().await.begin_login()?;

        tracing::info!(player_name, coordinator = %coordinator.target(), "logging in");
        let result = coordinator
            .with_timeout(self.config.login_timeout)
            .invoke(Call::Login {
                player: self.player.clone(),
                name: player_name.to_string(),
            })
            .await;

        let mut session = self.session.lock().await;
        match result {
            Ok(_) => {
                session.complete_login();
                tracing::info!(player_name, "logged in");
                Ok(())
            }
            Err(e) => {
                session.rollback_login();
                Err(match e {
                    RpcError::Remote(RemoteError::LoginRejected { reason }) => {
                        SessionError::LoginRejected { reason }
                    }
                    other => SessionError::Communication(other),
                })
            }
        }
    }

    /// Waits until the match ends or `interrupt` resolves, and returns the
    /// recorded outcome.
    ///
    /// An interrupt is recorded as `Aborted { reason: "external-interrupt" }`
    /// through the same path as a coordinator outcome, so whichever comes
    /// first is the one returned. Calling this again returns the recorded
    /// outcome immediately.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] if called again before an outcome was
    /// ever recorded.
    pub async fn await_termination<F>(&mut self, interrupt: F) -> Result<MatchOutcome, SessionError>
    where
        F: Future<Output = ()>,
    {
        let Some(mut outcome_rx) = self.outcome_rx.take() else {
            let session = self.session.lock().await;
            return session.outcome().cloned().ok_or_else(|| SessionError::InvalidState {
                operation: "await_termination",
                state: session.state().clone(),
            });
        };

        tokio::select! {
            biased;
            recorded = &mut outcome_rx => {
                if let Ok(outcome) = recorded {
                    tracing::info!(%outcome, "session terminated");
                    return Ok(outcome);
                }
            }
            () = interrupt => {
                tracing::info!("interrupt received, aborting session");
            }
        }

        let mut session = self.session.lock().await;
        session.record_outcome(MatchOutcome::aborted(EXTERNAL_INTERRUPT));
        let outcome = session
            .outcome()
            .cloned()
            .unwrap_or_else(|| MatchOutcome::aborted(EXTERNAL_INTERRUPT));
        tracing::info!(%outcome, "session terminated");
        Ok(outcome)
    }

    /// Deactivates the callback endpoint and releases the coordinator
    /// connection. Idempotent.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let units = self.unit_count().await;
        self.adapter.deactivate().await;
        self.coordinator = None;
        self.communicator.shutdown().await;

        tracing::info!(units, "session torn down");
    }

    // --- accessors -------------------------------------------------------

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state().clone()
    }

    /// Number of units the session owns.
    pub async fn unit_count(&self) -> usize {
        self.session.lock().await.unit_count()
    }

    /// References of the units the session owns, in creation order.
    pub async fn unit_refs(&self) -> Vec<ObjectRef> {
        let session = self.session.lock().await;
        let mut units: Vec<_> = session.units().collect();
        units.sort_by_key(|unit| unit.created_at());
        units.iter().map(|unit| unit.reference().clone()).collect()
    }

    /// The player handler's reference, as handed to the coordinator.
    pub fn player(&self) -> &ObjectRef {
        &self.player
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }
}

/// Dials the coordinator and checks that it is a game coordinator, all
/// within the login timeout.
async fn resolve_coordinator(
    communicator: &Communicator,
    config: &Configuration,
) -> Result<Proxy, SessionError> {
    let unreachable = |source| SessionError::UnreachableCoordinator {
        address: config.coordinator.to_string(),
        source,
    };

    let checked = tokio::time::timeout(config.login_timeout, async {
        communicator
            .proxy(&config.coordinator)
            .await?
            .checked_cast(GAME_TYPE_ID)
            .await
    })
    .await;

    match checked {
        Ok(Ok(proxy)) => Ok(proxy),
        Ok(Err(e)) => Err(unreachable(e)),
        Err(_) => Err(unreachable(RpcError::Timeout {
            operation: "IsA",
            timeout: config.login_timeout,
        })),
    }
}
