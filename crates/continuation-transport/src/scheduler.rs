//! Ability-scheduler channel: calls from the directory service into an ability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    protocol::{PeerReply, SCHEDULER_INTERFACE, SchedulerRequest},
    remote::{Parcel, RemoteHandle, RemoteStub, TransportError},
};

/// Continuation-related calls the directory service makes on an ability.
pub trait AbilityScheduler: Send + Sync {
    /// Start migrating this ability to `device_id`.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn continue_ability(&self, device_id: String) -> Result<(), TransportError>;

    /// Final outcome of a migration.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn notify_continuation_result(&self, result: i32) -> Result<(), TransportError>;

    /// The replica's reverse-scheduler handle for a reversible session.
    ///
    /// # Errors
    /// Returns error if the call could not be dispatched.
    fn receive_replica_scheduler(&self, replica: RemoteHandle) -> Result<(), TransportError>;
}

/// Server-side receiver for [`AbilityScheduler`].
pub struct AbilitySchedulerStub {
    handler: Arc<dyn AbilityScheduler>,
}

impl AbilitySchedulerStub {
    #[must_use]
    pub fn new(handler: Arc<dyn AbilityScheduler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl RemoteStub for AbilitySchedulerStub {
    fn interface(&self) -> &'static str {
        SCHEDULER_INTERFACE
    }

    async fn on_remote_request(&self, mut data: Parcel) -> Result<Parcel, TransportError> {
        let request: SchedulerRequest = data.decode(SCHEDULER_INTERFACE)?;
        tracing::debug!(?request, "ability scheduler stub received request");

        let result = match request {
            SchedulerRequest::ContinueAbility { device_id } => self.handler.continue_ability(device_id),
            SchedulerRequest::NotifyContinuationResult { result } => {
                self.handler.notify_continuation_result(result)
            }
            SchedulerRequest::ReceiveReplicaScheduler => {
                let replica = data.read_object()?;
                self.handler.receive_replica_scheduler(replica)
            }
        };
        PeerReply::from_result(result, |()| PeerReply::Ack).into_parcel(SCHEDULER_INTERFACE)
    }
}

/// Client-side caller for [`AbilityScheduler`], used by the directory service.
#[derive(Clone)]
pub struct AbilitySchedulerProxy {
    remote: RemoteHandle,
}

impl AbilitySchedulerProxy {
    #[must_use]
    pub fn new(remote: RemoteHandle) -> Self {
        Self { remote }
    }

    async fn call(&self, data: Parcel) -> Result<(), TransportError> {
        let reply = self.remote.send_request(data).await?;
        PeerReply::from_parcel(&reply, SCHEDULER_INTERFACE)?.into_ack()
    }

    /// # Errors
    /// Returns error on transport failure.
    pub async fn continue_ability(&self, device_id: &str) -> Result<(), TransportError> {
        let request = SchedulerRequest::ContinueAbility {
            device_id: device_id.to_string(),
        };
        self.call(Parcel::encode(SCHEDULER_INTERFACE, &request)?).await
    }

    /// # Errors
    /// Returns error on transport failure.
    pub async fn notify_continuation_result(&self, result: i32) -> Result<(), TransportError> {
        let request = SchedulerRequest::NotifyContinuationResult { result };
        self.call(Parcel::encode(SCHEDULER_INTERFACE, &request)?).await
    }

    /// # Errors
    /// Returns error on transport failure.
    pub async fn receive_replica_scheduler(&self, replica: RemoteHandle) -> Result<(), TransportError> {
        let data = Parcel::encode(SCHEDULER_INTERFACE, &SchedulerRequest::ReceiveReplicaScheduler)?
            .with_object(replica);
        self.call(data).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{local::LocalBinder, remote::RemoteObject};

    #[derive(Default)]
    struct Recorder {
        devices: Mutex<Vec<String>>,
        results: Mutex<Vec<i32>>,
        replicas: Mutex<Vec<crate::ObjectId>>,
    }

    impl AbilityScheduler for Recorder {
        fn continue_ability(&self, device_id: String) -> Result<(), TransportError> {
            self.devices.lock().unwrap().push(device_id);
            Ok(())
        }

        fn notify_continuation_result(&self, result: i32) -> Result<(), TransportError> {
            self.results.lock().unwrap().push(result);
            Ok(())
        }

        fn receive_replica_scheduler(&self, replica: RemoteHandle) -> Result<(), TransportError> {
            self.replicas.lock().unwrap().push(replica.id());
            Ok(())
        }
    }

    fn proxy(recorder: &Arc<Recorder>) -> AbilitySchedulerProxy {
        AbilitySchedulerProxy::new(LocalBinder::new(Arc::new(AbilitySchedulerStub::new(
            recorder.clone(),
        ))))
    }

    #[tokio::test]
    async fn test_proxy_reaches_handler() {
        let recorder = Arc::new(Recorder::default());
        let proxy = proxy(&recorder);
        let replica = LocalBinder::new(Arc::new(AbilitySchedulerStub::new(Arc::new(
            Recorder::default(),
        ))));

        tokio_test::assert_ok!(proxy.continue_ability("deviceB").await);
        tokio_test::assert_ok!(proxy.notify_continuation_result(0).await);
        tokio_test::assert_ok!(proxy.receive_replica_scheduler(replica.clone()).await);

        assert_eq!(*recorder.devices.lock().unwrap(), vec!["deviceB".to_string()]);
        assert_eq!(*recorder.results.lock().unwrap(), vec![0]);
        assert_eq!(*recorder.replicas.lock().unwrap(), vec![replica.id()]);
    }

    #[tokio::test]
    async fn test_replica_scheduler_without_handle_is_rejected() {
        let recorder = Arc::new(Recorder::default());
        let binder = LocalBinder::new(Arc::new(AbilitySchedulerStub::new(recorder.clone())));

        let data = Parcel::encode(SCHEDULER_INTERFACE, &SchedulerRequest::ReceiveReplicaScheduler).unwrap();
        let err = tokio_test::assert_err!(binder.send_request(data).await);

        assert!(matches!(err, TransportError::MissingObject));
        assert!(recorder.replicas.lock().unwrap().is_empty());
    }
}
