//! Unit controllers: one servant per unit the coordinator asked for.
//!
//! Units are isolated from each other. Each keeps its own counters and
//! nothing else; there is no channel between siblings. What a unit does
//! on its turn is not decided here, it only acknowledges the coordinator.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use drobots_protocol::{
    Call, Identity, ObjectRef, ROBOT_CONTROLLER_TYPE_ID, RemoteError, ReplyValue,
    UnitRequestId,
};
use drobots_rpc::{BoxFuture, Servant};

/// The servant behind one unit reference.
#[derive(Debug)]
pub struct UnitController {
    request_id: UnitRequestId,
    identity: Identity,
    reference: ObjectRef,
    created_at: u64,
    turns: AtomicU64,
    destroyed: AtomicBool,
}

impl UnitController {
    pub(crate) fn new(
        request_id: UnitRequestId,
        identity: Identity,
        reference: ObjectRef,
        created_at: u64,
    ) -> Self {
        Self {
            request_id,
            identity,
            reference,
            created_at,
            turns: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The coordinator request this unit was created for.
    pub fn request_id(&self) -> &UnitRequestId {
        &self.request_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The reference handed to the coordinator.
    pub fn reference(&self) -> &ObjectRef {
        &self.reference
    }

    /// Creation order within the session, starting at 0.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Turns received so far.
    pub fn turns(&self) -> u64 {
        self.turns.load(Ordering::Relaxed)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Relaxed)
    }

    fn on_turn(&self) {
        let turn = self.turns.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(unit = %self.identity, turn, "turn");
    }

    fn on_destroyed(&self) {
        if !self.destroyed.swap(true, Ordering::Relaxed) {
            tracing::info!(
                unit = %self.identity,
                request_id = %self.request_id,
                turns = self.turns(),
                "unit destroyed"
            );
        }
    }
}

impl Servant for UnitController {
    fn interface(&self) -> &'static str {
        ROBOT_CONTROLLER_TYPE_ID
    }

    fn dispatch(&self, call: Call) -> BoxFuture<'_, Result<ReplyValue, RemoteError>> {
        Box::pin(async move {
            match call {
                Call::Turn => {
                    self.on_turn();
                    Ok(ReplyValue::Unit)
                }
                Call::UnitDestroyed => {
                    self.on_destroyed();
                    Ok(ReplyValue::Unit)
                }
                other => Err(self.unsupported(&other)),
            }
        })
    }
}
