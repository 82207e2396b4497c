//! Core abstractions for cross-device ability continuation.
//!
//! This crate provides the fundamental building blocks:
//! - `AbilityDescriptor` - Identity of the ability being continued
//! - `StateBag` - Ordered key/value state carried across devices
//! - `MigrationEnvelope` - Descriptor + state + continuation flags
//! - `ContinuationCallback` and `AbilityHost` traits implemented by the ability

pub mod codes;
pub mod descriptor;
pub mod envelope;
pub mod state_bag;
pub mod traits;

pub use descriptor::AbilityDescriptor;
pub use envelope::{AbilityToken, ContinuationFlags, MigrationEnvelope};
pub use state_bag::{StateBag, StateValue};
pub use traits::{AbilityHost, ContinuationCallback, LifecycleState};
