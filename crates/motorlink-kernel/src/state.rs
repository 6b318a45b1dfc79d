//! [`BridgeState`] – the record shared by the receive loop and the watchdog.
//!
//! Only two things are tracked: the last action the device actually applied
//! and when the last *valid* command arrived.  The silence clock can only be
//! moved by [`BridgeState::record_command`].  The watchdog only writes
//! `last_action`, through [`BridgeState::set_last_action`] once its forced
//! STOP has been applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use motorlink_types::ActionCode;
use tracing::trace;

/// Last applied action and last valid-command timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeState {
    last_action: ActionCode,
    last_command_time: Instant,
}

impl BridgeState {
    /// Fresh state: device assumed stopped, silence clock starting at
    /// `started_at`.
    pub fn new(started_at: Instant) -> Self {
        Self {
            last_action: ActionCode::Stop,
            last_command_time: started_at,
        }
    }

    pub fn last_action(&self) -> ActionCode {
        self.last_action
    }

    pub fn last_command_time(&self) -> Instant {
        self.last_command_time
    }

    /// Note that a validly decoded command arrived at `at`.
    ///
    /// The timestamp only moves forward; an older `at` is ignored and
    /// `false` is returned.
    pub fn record_command(&mut self, at: Instant) -> bool {
        if at < self.last_command_time {
            trace!("ignoring stale command timestamp");
            return false;
        }
        self.last_command_time = at;
        true
    }

    /// Record that the device successfully applied `action`.
    pub fn set_last_action(&mut self, action: ActionCode) {
        self.last_action = action;
    }

    /// Set `last_action` to STOP without a device call, as shutdown does when
    /// its final STOP faults.  Leaves the silence clock untouched.
    pub fn mark_stopped(&mut self) {
        self.last_action = ActionCode::Stop;
    }

    /// Time since the last valid command, zero if `now` is earlier.
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_command_time)
    }
}

/// [`BridgeState`] behind the exclusive-access guard both actors share.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<BridgeState>>);

impl SharedState {
    pub fn new(started_at: Instant) -> Self {
        Self(Arc::new(Mutex::new(BridgeState::new(started_at))))
    }

    /// Lock the state.  A poisoned lock is recovered: every write is a
    /// single field store, so the record is never left half-updated.
    pub fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> BridgeState {
        *self.lock()
    }
}
