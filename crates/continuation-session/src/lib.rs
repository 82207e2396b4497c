//! Continuation sessions for a single ability.
//!
//! Provides:
//! - `AbilityContinuation` - Entry points used by the hosting ability
//! - `Coordinator` - Per-ability session state machine
//! - `ContinuationManager` - Progress tracking and timeouts
//! - `SchedulerDispatch` - Routes inbound calls onto the ability's queue
//! - `TaskQueue` - Single-threaded execution context
//! - Clients for the ability manager and distributed-scheduling service

pub mod ability;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod distributed;
pub mod error;
pub mod manager;
pub mod queue;

#[cfg(test)]
mod test_support;

pub use ability::{AbilityContinuation, Collaborators};
pub use config::ContinuationConfig;
pub use coordinator::{Coordinator, RoleKind};
pub use dispatch::SchedulerDispatch;
pub use distributed::{AbilityManagerClient, DirectoryServiceClient, DistributedClient};
pub use error::{ClientError, ContinuationError, DispatchError, FailureKind};
pub use manager::{ContinuationManager, ContinuationState, ManagerError, ProgressState};
pub use queue::TaskQueue;
