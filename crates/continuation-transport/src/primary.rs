//! Primary-callable channel: installed on the primary, called by the replica.

use std::sync::Arc;

use async_trait::async_trait;
use continuation_core::StateBag;

use crate::{
    protocol::{PRIMARY_INTERFACE, PeerReply, PrimaryRequest},
    remote::{Parcel, RemoteHandle, RemoteStub, TransportError},
};

/// Methods the replica may call on the primary.
///
/// Implementations run on the transport's thread and must return quickly.
pub trait PrimaryScheduler: Send + Sync {
    /// The replica ability terminated.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn notify_replica_terminated(&self) -> Result<(), TransportError>;

    /// The replica hands control back with its state.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn continuation_back(&self, state: StateBag) -> Result<bool, TransportError>;
}

/// Server-side receiver for [`PrimaryScheduler`].
pub struct PrimaryStub {
    handler: Arc<dyn PrimaryScheduler>,
}

impl PrimaryStub {
    #[must_use]
    pub fn new(handler: Arc<dyn PrimaryScheduler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RemoteStub for PrimaryStub {
    fn interface(&self) -> &'static str {
        PRIMARY_INTERFACE
    }

    async fn on_remote_request(&self, data: Parcel) -> Result<Parcel, TransportError> {
        let request: PrimaryRequest = data.decode(PRIMARY_INTERFACE)?;
        tracing::debug!(?request, "primary stub received request");

        let reply = match request {
            PrimaryRequest::NotifyReplicaTerminated => {
                PeerReply::from_result(self.handler.notify_replica_terminated(), |()| PeerReply::Ack)
            }
            PrimaryRequest::ContinuationBack { state } => {
                PeerReply::from_result(self.handler.continuation_back(state), |ok| {
                    PeerReply::Accepted { ok }
                })
            }
        };
        reply.into_parcel(PRIMARY_INTERFACE)
    }
}

/// Client-side caller for [`PrimaryScheduler`], held by the replica.
#[derive(Clone)]
pub struct PrimaryProxy {
    remote: RemoteHandle,
}

impl PrimaryProxy {
    #[must_use]
    pub fn new(remote: RemoteHandle) -> Self {
        Self { remote }
    }

    /// Underlying remote handle.
    #[must_use]
    pub fn remote(&self) -> &RemoteHandle {
        &self.remote
    }

    /// Tell the primary the replica is going away.
    ///
    /// # Errors
    /// Returns error on transport failure.
    pub async fn notify_replica_terminated(&self) -> Result<(), TransportError> {
        let data = Parcel::encode(PRIMARY_INTERFACE, &PrimaryRequest::NotifyReplicaTerminated)?;
        let reply = self.remote.send_request(data).await?;
        PeerReply::from_parcel(&reply, PRIMARY_INTERFACE)?.into_ack()
    }

    /// Hand control back to the primary.
    ///
    /// # Errors
    /// Returns error on transport failure.
    pub async fn continuation_back(&self, state: StateBag) -> Result<bool, TransportError> {
        let data = Parcel::encode(PRIMARY_INTERFACE, &PrimaryRequest::ContinuationBack { state })?;
        let reply = self.remote.send_request(data).await?;
        PeerReply::from_parcel(&reply, PRIMARY_INTERFACE)?.into_bool()
    }
}

impl std::fmt::Debug for PrimaryProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryProxy")
            .field("remote", &self.remote.id())
            .finish()
    }
}
