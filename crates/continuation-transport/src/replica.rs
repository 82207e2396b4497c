//! Replica-callable channel: installed on the replica, called by the primary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    protocol::{PeerReply, REPLICA_INTERFACE, ReplicaRequest},
    remote::{Parcel, RemoteHandle, RemoteStub, TransportError},
};

/// Methods the primary may call on the replica.
///
/// Implementations run on the transport's thread and must return quickly.
pub trait ReplicaScheduler: Send + Sync {
    /// Receive the primary's callback handle.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn pass_primary(&self, primary: RemoteHandle) -> Result<(), TransportError>;

    /// The primary asks the replica to begin a reversal.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn reverse_continuation(&self) -> Result<bool, TransportError>;

    /// Outcome of the primary's restore.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn notify_reverse_result(&self, result: i32) -> Result<(), TransportError>;
}

/// Server-side receiver for [`ReplicaScheduler`].
pub struct ReplicaStub {
    handler: Arc<dyn ReplicaScheduler>,
}

impl ReplicaStub {
    #[must_use]
    pub fn new(handler: Arc<dyn ReplicaScheduler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RemoteStub for ReplicaStub {
    fn interface(&self) -> &'static str {
        REPLICA_INTERFACE
    }

    async fn on_remote_request(&self, mut data: Parcel) -> Result<Parcel, TransportError> {
        let request: ReplicaRequest = data.decode(REPLICA_INTERFACE)?;
        tracing::debug!(?request, "replica stub received request");

        let reply = match request {
            ReplicaRequest::PassPrimary => {
                let primary = data.read_object()?;
                PeerReply::from_result(self.handler.pass_primary(primary), |()| PeerReply::Ack)
            }
            ReplicaRequest::ReverseContinuation => {
                PeerReply::from_result(self.handler.reverse_continuation(), |ok| {
                    PeerReply::Accepted { ok }
                })
            }
            ReplicaRequest::NotifyReverseResult { result } => {
                PeerReply::from_result(self.handler.notify_reverse_result(result), |()| {
                    PeerReply::Ack
                })
            }
        };
        reply.into_parcel(REPLICA_INTERFACE)
    }
}

/// Client-side caller for [`ReplicaScheduler`], held by the primary.
#[derive(Clone)]
pub struct ReplicaProxy {
    remote: RemoteHandle,
}

impl ReplicaProxy {
    #[must_use]
    pub fn new(remote: RemoteHandle) -> Self {
        Self { remote }
    }

    /// Underlying remote handle.
    #[must_use]
    pub fn remote(&self) -> &RemoteHandle {
        &self.remote
    }

    /// Send the primary's callback handle.
    ///
    /// # Errors
    /// Returns error on transport failure.
    pub async fn pass_primary(&self, primary: RemoteHandle) -> Result<(), TransportError> {
        let data = Parcel::encode(REPLICA_INTERFACE, &ReplicaRequest::PassPrimary)?.with_object(primary);
        let reply = self.remote.send_request(data).await?;
        PeerReply::from_parcel(&reply, REPLICA_INTERFACE)?.into_ack()
    }

    /// Ask the replica to start reversal.
    ///
    /// # Errors
    /// Returns error on transport failure.
    pub async fn reverse_continuation(&self) -> Result<bool, TransportError> {
        let data = Parcel::encode(REPLICA_INTERFACE, &ReplicaRequest::ReverseContinuation)?;
        let reply = self.remote.send_request(data).await?;
        PeerReply::from_parcel(&reply, REPLICA_INTERFACE)?.into_bool()
    }

    /// Report the restore outcome.
    ///
    /// # Errors
    /// Returns error on transport failure.
    pub async fn notify_reverse_result(&self, result: i32) -> Result<(), TransportError> {
        let data = Parcel::encode(REPLICA_INTERFACE, &ReplicaRequest::NotifyReverseResult { result })?;
        let reply = self.remote.send_request(data).await?;
        PeerReply::from_parcel(&reply, REPLICA_INTERFACE)?.into_ack()
    }
}

impl std::fmt::Debug for ReplicaProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaProxy")
            .field("remote", &self.remote.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        local::LocalBinder,
        primary::{PrimaryScheduler, PrimaryStub},
        remote::{ObjectId, RemoteObject},
    };

    #[derive(Default)]
    struct Recorder {
        primaries: Mutex<Vec<ObjectId>>,
        results: Mutex<Vec<i32>>,
    }

    impl ReplicaScheduler for Recorder {
        fn pass_primary(&self, primary: RemoteHandle) -> Result<(), TransportError> {
            self.primaries.lock().unwrap().push(primary.id());
            Ok(())
        }

        fn reverse_continuation(&self) -> Result<bool, TransportError> {
            Ok(true)
        }

        fn notify_reverse_result(&self, result: i32) -> Result<(), TransportError> {
            self.results.lock().unwrap().push(result);
            Ok(())
        }
    }

    struct NoopPrimary;

    impl PrimaryScheduler for NoopPrimary {
        fn notify_replica_terminated(&self) -> Result<(), TransportError> {
            Ok(())
        }
        fn continuation_back(&self, _state: continuation_core::StateBag) -> Result<bool, TransportError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_pass_primary_carries_handle() {
        let recorder = Arc::new(Recorder::default());
        let replica = ReplicaProxy::new(LocalBinder::new(Arc::new(ReplicaStub::new(recorder.clone()))));
        let primary = LocalBinder::new(Arc::new(PrimaryStub::new(Arc::new(NoopPrimary))));
        let primary_id = primary.id();

        tokio_test::assert_ok!(replica.pass_primary(primary).await);

        assert_eq!(recorder.primaries.lock().unwrap().as_slice(), &[primary_id]);
    }

    #[tokio::test]
    async fn test_reverse_calls() {
        let recorder = Arc::new(Recorder::default());
        let replica = ReplicaProxy::new(LocalBinder::new(Arc::new(ReplicaStub::new(recorder.clone()))));

        assert!(tokio_test::assert_ok!(replica.reverse_continuation().await));
        tokio_test::assert_ok!(replica.notify_reverse_result(7).await);

        assert_eq!(recorder.results.lock().unwrap().as_slice(), &[7]);
    }

    #[tokio::test]
    async fn test_pass_primary_without_object_is_rejected() {
        let recorder = Arc::new(Recorder::default());
        let binder = LocalBinder::new(Arc::new(ReplicaStub::new(recorder.clone())));

        let data = Parcel::encode(REPLICA_INTERFACE, &ReplicaRequest::PassPrimary).unwrap();
        let result = binder.send_request(data).await;

        assert!(matches!(result, Err(TransportError::MissingObject)));
        assert!(recorder.primaries.lock().unwrap().is_empty());
    }
}
