//! Peer RPC layer for ability continuation.
//!
//! Provides:
//! - Transport seam (`RemoteObject`, `RemoteStub`, `Parcel`)
//! - Wire protocol (JSON payload + out-of-band handles)
//! - Primary-callable, replica-callable and ability-scheduler stub/proxy pairs
//! - `LivenessMonitor` for peer death detection
//! - In-process binder transport (feature: local)

pub mod liveness;
pub mod primary;
pub mod protocol;
pub mod remote;
pub mod replica;
pub mod scheduler;

#[cfg(feature = "local")]
pub mod local;

pub use liveness::LivenessMonitor;
pub use primary::{PrimaryProxy, PrimaryScheduler, PrimaryStub};
pub use protocol::{PeerReply, PrimaryRequest, ReplicaRequest, SchedulerRequest};
pub use remote::{
    DeathRecipient, ObjectId, Parcel, RemoteHandle, RemoteObject, RemoteStub, StubBinder,
    TransportError,
};
pub use replica::{ReplicaProxy, ReplicaScheduler, ReplicaStub};
pub use scheduler::{AbilityScheduler, AbilitySchedulerProxy, AbilitySchedulerStub};

#[cfg(feature = "local")]
pub use local::{LocalBinder, LocalTransport};
