//! The player handler: the servant the coordinator calls back on.
//!
//! The coordinator invokes it for two things. It asks for units
//! (`CreateUnit`) and it reports the end of the match once
//! (`ReportOutcome`). Both may arrive concurrently with each other and
//! with login, so every decision is taken under the session lock, and the
//! lock is dropped before anything that awaits on the adapter.

use std::sync::{Arc, Weak};
use std::time::Duration;

use drobots_protocol::{
    Call, MatchOutcome, ObjectRef, PLAYER_TYPE_ID, RemoteError, ReplyValue,
    UnitRequestId,
};
use drobots_rpc::{BoxFuture, ObjectAdapter, RpcError, Servant, generate_identity};
use tokio::sync::watch;

use crate::session::{Admission, SharedSession};
use crate::{SessionError, SessionState, UnitController};

/// Servant for the player object registered at bootstrap.
pub struct PlayerHandler {
    session: SharedSession,
    /// Weak because the adapter owns this handler.
    adapter: Weak<ObjectAdapter>,
    states: watch::Receiver<SessionState>,
    login_timeout: Duration,
}

impl PlayerHandler {
    pub(crate) fn new(
        session: SharedSession,
        adapter: Weak<ObjectAdapter>,
        states: watch::Receiver<SessionState>,
        login_timeout: Duration,
    ) -> Self {
        Self {
            session,
            adapter,
            states,
            login_timeout,
        }
    }

    /// Creates (or finds) the unit for `request_id` and returns its
    /// reference.
    ///
    /// Duplicate deliveries of the same request id get the same reference.
    /// A request that arrives while login is in flight waits for it to
    /// settle, at most for the login timeout.
    ///
    /// # Errors
    /// - [`SessionError::CapacityExceeded`] if the session already has its
    ///   maximum number of units, or has terminated
    /// - [`SessionError::SessionInactive`] before login, or if the adapter
    ///   is gone
    pub async fn on_create_unit(
        &self,
        request_id: UnitRequestId,
    ) -> Result<ObjectRef, SessionError> {
        let created_at = match self.admit(&request_id).await? {
            Admission::Accepted { created_at } => created_at,
            Admission::Existing(reference) => {
                tracing::debug!(%request_id, unit = %reference.identity(), "duplicate unit request");
                return Ok(reference);
            }
            Admission::AwaitLogin => return Err(SessionError::SessionInactive),
        };

        let adapter = self.adapter.upgrade().ok_or(SessionError::SessionInactive)?;
        let identity = generate_identity();
        let reference = adapter.object_ref(identity.clone());
        let unit = Arc::new(UnitController::new(
            request_id.clone(),
            identity.clone(),
            reference,
            created_at,
        ));

        // Registered without the session lock held.
        adapter
            .add(identity.clone(), Arc::clone(&unit) as Arc<dyn Servant>)
            .await
            .map_err(|e| match e {
                RpcError::Deactivated => SessionError::SessionInactive,
                other => SessionError::Communication(other),
            })?;

        let inserted = self.session.lock().await.insert_unit(unit);
        match inserted {
            Ok(reference) if reference.identity() == &identity => {
                tracing::info!(%request_id, unit = %identity, created_at, "unit created");
                Ok(reference)
            }
            Ok(winner) => {
                adapter.remove(&identity).await;
                tracing::debug!(%request_id, unit = %winner.identity(), "concurrent duplicate won");
                Ok(winner)
            }
            Err(e) => {
                adapter.remove(&identity).await;
                Err(e)
            }
        }
    }

    /// Records the match outcome. Only the first call has any effect.
    ///
    /// Returns `true` if this call's outcome was the one recorded.
    pub async fn on_match_outcome(&self, outcome: MatchOutcome) -> bool {
        let recorded = self.session.lock().await.record_outcome(outcome.clone());
        if recorded {
            tracing::info!(%outcome, "match outcome recorded");
        } else {
            tracing::warn!(%outcome, "match outcome already recorded, ignoring");
        }
        recorded
    }

    /// Asks the session for admission, waiting out an in-flight login.
    async fn admit(&self, request_id: &UnitRequestId) -> Result<Admission, SessionError> {
        let deadline = tokio::time::Instant::now() + self.login_timeout;
        loop {
            let admission = self.session.lock().await.admit_unit(request_id)?;
            if !matches!(admission, Admission::AwaitLogin) {
                return Ok(admission);
            }

            tracing::debug!(%request_id, "unit requested during login, waiting");
            let mut states = self.states.clone();
            if tokio::time::timeout_at(deadline, login_settled(&mut states))
                .await
                .is_err()
            {
                return Ok(Admission::AwaitLogin);
            }
        }
    }
}

/// How a rejected unit request is reported back to the coordinator.
fn to_remote_error(err: &SessionError) -> RemoteError {
    match err {
        SessionError::CapacityExceeded { max } => RemoteError::CapacityExceeded { max: *max },
        SessionError::SessionInactive => RemoteError::SessionInactive,
        other => RemoteError::Unknown {
            message: other.to_string(),
        },
    }
}

/// Resolves once the session leaves `AwaitingLogin`.
async fn login_settled(states: &mut watch::Receiver<SessionState>) {
    while *states.borrow_and_update() == SessionState::AwaitingLogin {
        if states.changed().await.is_err() {
            return;
        }
    }
}

impl Servant for PlayerHandler {
    fn interface(&self) -> &'static str {
        PLAYER_TYPE_ID
    }

    fn dispatch(&self, call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>> {
        Box::pin(async move {
            match call {
                Call::CreateUnit { request_id } => {
                    match self.on_create_unit(request_id.clone()).await {
                        Ok(reference) => Ok(ReplyValue::Object(reference)),
                        Err(e) => {
                            tracing::warn!(%request_id, error = %e, "unit request rejected");
                            Err(to_remote_error(&e))
                        }
                    }
                }
                Call::ReportOutcome { outcome } => {
                    self.on_match_outcome(outcome).await;
                    Ok(ReplyValue::Unit)
                }
                other => Err(self.unsupported(&other)),
            }
        })
    }
}
