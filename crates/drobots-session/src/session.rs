//! The session record: lifecycle state plus the units it owns.
//!
//! A [`Session`] is shared between the [`SessionManager`](crate::SessionManager)
//! and the [`PlayerHandler`](crate::PlayerHandler) behind one
//! `tokio::sync::Mutex`. Every method here runs under that lock and none of
//! them awaits, so the lock is only ever held for a few field updates.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use drobots_protocol::{MatchOutcome, ObjectRef, UnitRequestId};
use tokio::sync::{Mutex, oneshot, watch};

use crate::{SessionError, UnitController};

/// The session as shared between the manager and the player handler.
pub(crate) type SharedSession = Arc<Mutex<Session>>;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///   Bootstrapping ──(login)──→ AwaitingLogin ──(accepted)──→ Active
///         ↑                          │                          │
///         └────(rejected/failed)─────┘                     (outcome)
///                                                               ↓
///                                                   Terminated(outcome)
/// ```
///
/// An outcome may arrive in any state; once `Terminated`, nothing changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Bootstrapping,
    AwaitingLogin,
    Active,
    Terminated(MatchOutcome),
}

impl SessionState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::AwaitingLogin => write!(f, "awaiting login"),
            Self::Active => write!(f, "active"),
            Self::Terminated(outcome) => write!(f, "terminated ({outcome})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// The answer to "may a unit be created for this request id right now?".
#[derive(Debug)]
pub(crate) enum Admission {
    /// The request id already has a unit; hand its reference back.
    Existing(ObjectRef),
    /// Go ahead. The unit gets this creation order.
    Accepted { created_at: u64 },
    /// Login is still in flight; ask again once it settles.
    AwaitLogin,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub(crate) struct Session {
    state: SessionState,
    units: HashMap<UnitRequestId, Arc<UnitController>>,
    /// Creation order handed to the next admitted unit. Strictly
    /// increasing; a unit discarded after losing a duplicate race leaves
    /// a gap.
    next_unit_seq: u64,
    max_units: usize,
    /// Taken by the first recorded outcome.
    outcome_tx: Option<oneshot::Sender<MatchOutcome>>,
    /// Mirrors `state` for tasks that wait on a transition.
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    /// Creates a session in `Bootstrapping`, along with the receiver that
    /// resolves when an outcome is recorded.
    pub(crate) fn new(max_units: usize) -> (Self, oneshot::Receiver<MatchOutcome>) {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (state_tx, _) = watch::channel(SessionState::Bootstrapping);
        let session = Self {
            state: SessionState::Bootstrapping,
            units: HashMap::new(),
            next_unit_seq: 0,
            max_units,
            outcome_tx: Some(outcome_tx),
            state_tx,
        };
        (session, outcome_rx)
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub(crate) fn units(&self) -> impl Iterator<Item = &Arc<UnitController>> {
        self.units.values()
    }

    /// The recorded outcome, once terminated.
    pub(crate) fn outcome(&self) -> Option<&MatchOutcome> {
        match &self.state {
            SessionState::Terminated(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state.clone();
        self.state_tx.send_replace(state);
    }

    // --- login -----------------------------------------------------------

    /// `Bootstrapping → AwaitingLogin`.
    pub(crate) fn begin_login(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Bootstrapping {
            return Err(SessionError::InvalidState {
                operation: "login",
                state: self.state.clone(),
            });
        }
        self.set_state(SessionState::AwaitingLogin);
        Ok(())
    }

    /// `AwaitingLogin → Active`. A no-op if an outcome arrived meanwhile.
    pub(crate) fn complete_login(&mut self) {
        if self.state == SessionState::AwaitingLogin {
            self.set_state(SessionState::Active);
        }
    }

    /// `AwaitingLogin → Bootstrapping`. A no-op if an outcome arrived
    /// meanwhile.
    pub(crate) fn rollback_login(&mut self) {
        if self.state == SessionState::AwaitingLogin {
            self.set_state(SessionState::Bootstrapping);
        }
    }

    // --- outcome ---------------------------------------------------------

    /// Records the match outcome and wakes whoever awaits termination.
    ///
    /// Returns `false` (and changes nothing) if an outcome was already
    /// recorded.
    pub(crate) fn record_outcome(&mut self, outcome: MatchOutcome) -> bool {
        if self.state.is_terminated() {
            return false;
        }
        self.set_state(SessionState::Terminated(outcome.clone()));
        if let Some(tx) = self.outcome_tx.take() {
            let _ = tx.send(outcome);
        }
        true
    }

    // --- units -----------------------------------------------------------

    /// Decides whether a unit may be created for `request_id`.
    ///
    /// An accepted admission reserves a creation order but no capacity;
    /// [`insert_unit`](Self::insert_unit) checks capacity again.
    pub(crate) fn admit_unit(
        &mut self,
        request_id: &UnitRequestId,
    ) -> Result<Admission, SessionError> {
        match &self.state {
            SessionState::Bootstrapping => return Err(SessionError::SessionInactive),
            SessionState::AwaitingLogin => return Ok(Admission::AwaitLogin),
            SessionState::Terminated(_) => {
                return Err(SessionError::CapacityExceeded {
                    max: self.max_units,
                });
            }
            SessionState::Active => {}
        }

        if let Some(unit) = self.units.get(request_id) {
            return Ok(Admission::Existing(unit.reference().clone()));
        }
        if self.units.len() >= self.max_units {
            return Err(SessionError::CapacityExceeded {
                max: self.max_units,
            });
        }

        let created_at = self.next_unit_seq;
        self.next_unit_seq += 1;
        Ok(Admission::Accepted { created_at })
    }

    /// Inserts an already registered unit, unless something changed since
    /// it was admitted.
    ///
    /// Returns the reference the coordinator should get: `unit`'s own, or
    /// that of a unit inserted for the same request id in the meantime.
    /// In the latter case `unit` is not inserted and the caller must
    /// unregister it.
    pub(crate) fn insert_unit(
        &mut self,
        unit: Arc<UnitController>,
    ) -> Result<ObjectRef, SessionError> {
        if self.state.is_terminated() {
            return Err(SessionError::CapacityExceeded {
                max: self.max_units,
            });
        }
        if let Some(existing) = self.units.get(unit.request_id()) {
            return Ok(existing.reference().clone());
        }
        if self.units.len() >= self.max_units {
            return Err(SessionError::CapacityExceeded {
                max: self.max_units,
            });
        }

        let reference = unit.reference().clone();
        self.units.insert(unit.request_id().clone(), unit);
        Ok(reference)
    }
}
