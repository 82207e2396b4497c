//! Continuation progress tracking for one ability.
//!
//! [`ContinuationManager`] wraps the ability's own [`ContinuationCallback`]
//! and is what the coordinator actually calls. It gates new requests on the
//! ability's progress and continuation state, and arms a timeout so a
//! migration that never completes does not wedge the ability.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use continuation_core::{AbilityHost, ContinuationCallback, StateBag, codes};
use serde::{Deserialize, Serialize};

use crate::{config::ContinuationConfig, error::DispatchError, queue::TaskQueue};

/// Delayed task that returns a stuck request to `Initial`.
const RESTORE_STATE_TASK: &str = "restore_state_when_timeout";

/// Where the current continuation request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Initial,
    /// Request accepted, waiting for the scheduler to drive it.
    WaitingSchedule,
    /// Callbacks are running or the outcome is pending.
    InProgress,
}

/// Where the ability's live instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationState {
    /// Running here, not continued anywhere.
    LocalRunning,
    /// Continued reversibly to another device.
    RemoteRunning,
    /// This instance is the reversible replica of a remote primary.
    ReplicaRunning,
}

/// Manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Ability is not available for continuation")]
    Unavailable,
    #[error("Another request in progress: {0:?}")]
    Busy(ProgressState),
    #[error("Illegal continuation state: {0:?}")]
    IllegalState(ContinuationState),
    #[error("Device id is empty")]
    EmptyDeviceId,
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug)]
struct Progress {
    progress: ProgressState,
    continuation: ContinuationState,
    reversible: bool,
    original_device_id: String,
}

impl Progress {
    fn change(&mut self, new_state: ProgressState) {
        tracing::debug!(from = ?self.progress, to = ?new_state, "progress state change");
        self.progress = new_state;
    }
}

/// Progress-tracking decorator around an ability's continuation callback.
pub struct ContinuationManager {
    inner: Arc<dyn ContinuationCallback>,
    host: Arc<dyn AbilityHost>,
    queue: TaskQueue,
    config: ContinuationConfig,
    state: Arc<Mutex<Progress>>,
}

impl ContinuationManager {
    /// Create a manager in `Initial` / `LocalRunning`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn ContinuationCallback>,
        host: Arc<dyn AbilityHost>,
        queue: TaskQueue,
        config: ContinuationConfig,
    ) -> Self {
        Self {
            inner,
            host,
            queue,
            config,
            state: Arc::new(Mutex::new(Progress {
                progress: ProgressState::Initial,
                continuation: ContinuationState::LocalRunning,
                reversible: false,
                original_device_id: String::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, Progress> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn progress_state(&self) -> ProgressState {
        self.state().progress
    }

    #[must_use]
    pub fn continuation_state(&self) -> ContinuationState {
        self.state().continuation
    }

    /// Device the ability was continued from, when it is a replica.
    #[must_use]
    pub fn original_device_id(&self) -> String {
        self.state().original_device_id.clone()
    }

    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.state().reversible
    }

    fn is_available(&self) -> bool {
        let lifecycle = self.host.lifecycle_state();
        if !lifecycle.accepts_continuation() {
            tracing::error!(?lifecycle, "ability not available for continuation");
            return false;
        }
        true
    }

    /// Accept a new outbound continuation request.
    ///
    /// Moves to `WaitingSchedule`; undo with [`abort_request`](Self::abort_request)
    /// if the request could not be handed to the queue.
    ///
    /// # Errors
    /// Returns error if the ability is torn down, another request is in
    /// progress, or the ability is not running locally.
    pub fn begin_continuation(&self, reversible: bool) -> Result<(), ManagerError> {
        if !self.is_available() {
            return Err(ManagerError::Unavailable);
        }
        let mut state = self.state();
        if state.progress != ProgressState::Initial {
            return Err(ManagerError::Busy(state.progress));
        }
        if state.continuation != ContinuationState::LocalRunning {
            return Err(ManagerError::IllegalState(state.continuation));
        }
        state.reversible = reversible;
        state.change(ProgressState::WaitingSchedule);
        Ok(())
    }

    /// Check that a reversal may be requested from this (primary) side.
    ///
    /// # Errors
    /// Returns error unless idle and continued reversibly to a remote device.
    pub fn check_reverse_allowed(&self) -> Result<(), ManagerError> {
        let state = self.state();
        if state.progress != ProgressState::Initial {
            return Err(ManagerError::Busy(state.progress));
        }
        if state.continuation != ContinuationState::RemoteRunning {
            return Err(ManagerError::IllegalState(state.continuation));
        }
        Ok(())
    }

    /// The replica accepted a reversal request; wait for its data.
    pub fn reverse_requested(&self) {
        self.state().change(ProgressState::WaitingSchedule);
        self.restore_state_when_timeout(self.config.reverse_timeout(), ProgressState::WaitingSchedule);
    }

    /// Return to `Initial` after a request that never started.
    pub fn abort_request(&self) {
        self.change_state_to_init();
    }

    /// Restore state carried by the envelope this replica was created with.
    pub fn restore_data(&self, state: &StateBag, reversible: bool, original_device_id: &str) -> bool {
        self.state().change(ProgressState::InProgress);
        let restored = self.is_available() && self.inner.restore_state(state);
        if !restored {
            tracing::error!("ability failed to restore continuation data");
        }

        let mut progress = self.state();
        if reversible {
            progress.continuation = ContinuationState::ReplicaRunning;
        }
        progress.reversible = reversible;
        progress.original_device_id = original_device_id.to_string();
        progress.change(ProgressState::Initial);
        restored
    }

    fn change_state_to_init(&self) {
        if self.queue.remove_task(RESTORE_STATE_TASK) {
            tracing::debug!("restore-state timeout cancelled");
        }
        self.state().change(ProgressState::Initial);
    }

    fn restore_state_when_timeout(&self, timeout: Duration, pre_state: ProgressState) {
        let weak: Weak<Mutex<Progress>> = Arc::downgrade(&self.state);
        self.queue.post_delayed(RESTORE_STATE_TASK, timeout, async move {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            tracing::info!(?pre_state, current = ?state.progress, "continuation timed out");
            if state.progress == pre_state {
                state.change(ProgressState::Initial);
            }
        });
    }
}

impl ContinuationCallback for ContinuationManager {
    fn approve_start(&self) -> bool {
        self.state().change(ProgressState::InProgress);
        let approved = self.is_available() && self.inner.approve_start();
        if !approved {
            self.state().change(ProgressState::Initial);
        }
        approved
    }

    fn save_state(&self) -> Option<StateBag> {
        let saved = if self.is_available() {
            self.inner.save_state()
        } else {
            None
        };
        if saved.is_some() {
            self.restore_state_when_timeout(self.config.schedule_timeout(), ProgressState::InProgress);
        } else {
            tracing::error!("ability failed to save continuation data");
            self.state().change(ProgressState::Initial);
        }
        saved
    }

    /// State handed back by the replica. The request ends either way; only
    /// success brings the ability back to `LocalRunning`.
    fn restore_state(&self, state: &StateBag) -> bool {
        self.state().change(ProgressState::InProgress);
        let restored = self.inner.restore_state(state);
        self.change_state_to_init();
        if restored {
            self.state().continuation = ContinuationState::LocalRunning;
        }
        restored
    }

    fn complete_continuation(&self, result: i32) {
        if !self.is_available() {
            return;
        }
        let reversible = {
            let mut state = self.state();
            if codes::is_ok(result) && state.reversible {
                state.continuation = ContinuationState::RemoteRunning;
            }
            state.reversible
        };
        self.change_state_to_init();

        self.inner.complete_continuation(result);
        if !reversible {
            tracing::info!(result, "non-reversible continuation finished, terminating ability");
            self.host.terminate_ability();
        }
    }

    fn notify_peer_gone(&self) {
        {
            let mut state = self.state();
            state.continuation = ContinuationState::LocalRunning;
        }
        self.change_state_to_init();
        self.inner.notify_peer_gone();
    }

    fn on_continue(&self) -> Result<StateBag, i32> {
        self.inner.on_continue()
    }
}

impl std::fmt::Debug for ContinuationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationManager")
            .field("state", &*self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
