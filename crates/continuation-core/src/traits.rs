//! Contracts implemented by the ability that is being continued.

use serde::{Deserialize, Serialize};

use crate::{
    StateBag,
    codes::{CONTINUE_ABILITY_REJECTED, CONTINUE_SAVE_DATA_FAILED},
};

/// Lifecycle state of the hosting ability, as far as continuation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Initial,
    Inactive,
    Active,
    Background,
    /// Torn down; no continuation callback may be issued.
    Uninitialized,
}

impl LifecycleState {
    /// Whether continuation callbacks may still be delivered.
    #[must_use]
    pub const fn accepts_continuation(self) -> bool {
        !matches!(self, Self::Uninitialized)
    }
}

/// Continuation hooks implemented by the ability's business logic.
///
/// All methods are invoked on the ability's own task queue.
pub trait ContinuationCallback: Send + Sync {
    /// Ask whether the ability agrees to start a continuation.
    fn approve_start(&self) -> bool;

    /// Serialize the ability's state. `None` means the ability failed to save.
    fn save_state(&self) -> Option<StateBag>;

    /// Restore state produced by [`save_state`](Self::save_state) on a peer.
    fn restore_state(&self, state: &StateBag) -> bool;

    /// Final outcome of a migration, as reported by the directory service.
    fn complete_continuation(&self, result: i32);

    /// The peer ability went away (terminated or unreachable).
    fn notify_peer_gone(&self);

    /// Combined approve + save used by the stack-carrying continuation path.
    ///
    /// Returns the state bag, or the result code describing which step failed.
    ///
    /// # Errors
    /// Returns `CONTINUE_ABILITY_REJECTED` or `CONTINUE_SAVE_DATA_FAILED`.
    fn on_continue(&self) -> Result<StateBag, i32> {
        if !self.approve_start() {
            return Err(CONTINUE_ABILITY_REJECTED);
        }
        self.save_state().ok_or(CONTINUE_SAVE_DATA_FAILED)
    }
}

/// Lifecycle surface of the hosting ability used by continuation.
pub trait AbilityHost: Send + Sync {
    /// Terminate this ability instance.
    fn terminate_ability(&self);

    /// Current lifecycle state.
    fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{CONTINUE_ABILITY_REJECTED, CONTINUE_SAVE_DATA_FAILED};

    struct Fixed {
        approve: bool,
        save: Option<StateBag>,
    }

    impl ContinuationCallback for Fixed {
        fn approve_start(&self) -> bool {
            self.approve
        }
        fn save_state(&self) -> Option<StateBag> {
            self.save.clone()
        }
        fn restore_state(&self, _state: &StateBag) -> bool {
            true
        }
        fn complete_continuation(&self, _result: i32) {}
        fn notify_peer_gone(&self) {}
    }

    #[test]
    fn test_on_continue_rejected() {
        let cb = Fixed {
            approve: false,
            save: Some(StateBag::new()),
        };
        assert_eq!(cb.on_continue(), Err(CONTINUE_ABILITY_REJECTED));
    }

    #[test]
    fn test_on_continue_save_failed() {
        let cb = Fixed {
            approve: true,
            save: None,
        };
        assert_eq!(cb.on_continue(), Err(CONTINUE_SAVE_DATA_FAILED));
    }

    #[test]
    fn test_on_continue_ok() {
        let cb = Fixed {
            approve: true,
            save: Some(StateBag::new().with("k", "v")),
        };
        let bag = tokio_test::assert_ok!(cb.on_continue());
        assert_eq!(bag.get_string("k"), Some("v"));
    }

    #[test]
    fn test_uninitialized_rejects_continuation() {
        assert!(LifecycleState::Active.accepts_continuation());
        assert!(!LifecycleState::Uninitialized.accepts_continuation());
    }
}
