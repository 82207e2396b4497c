//! Clients for the external ability manager and distributed-scheduling service.

use async_trait::async_trait;
use continuation_core::{AbilityToken, MigrationEnvelope, codes};
use continuation_transport::{Parcel, PeerReply, RemoteHandle};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Interface token of the distributed-scheduling service.
pub const DIRECTORY_INTERFACE: &str = "ability.continuation.DistributedScheduler";

/// Asks the ability manager to instantiate the continued ability on the target.
#[async_trait]
pub trait AbilityManagerClient: Send + Sync {
    /// Start the continuation described by `envelope`.
    ///
    /// `status` is the local outcome of preparing the envelope; the stack
    /// path forwards it even when preparation failed.
    async fn instantiate(
        &self,
        envelope: MigrationEnvelope,
        token: AbilityToken,
        status: i32,
    ) -> Result<(), ClientError>;
}

/// Reports migration outcomes to the distributed-scheduling service.
#[async_trait]
pub trait DirectoryServiceClient: Send + Sync {
    /// One-shot completion notice for `session_id`.
    ///
    /// `reply` is the replica's reverse-scheduler handle for reversible sessions.
    async fn report_completion(
        &self,
        origin_device_id: &str,
        session_id: i32,
        success: bool,
        reply: Option<RemoteHandle>,
    ) -> Result<(), ClientError>;
}

/// Request sent to the distributed-scheduling service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryRequest {
    /// Replica handle, if any, is attached as the first parcel object.
    NotifyCompleteContinuation {
        origin_device_id: String,
        session_id: i32,
        success: bool,
    },
}

/// [`DirectoryServiceClient`] talking to the service over a remote handle.
///
/// Passed to each ability explicitly; there is no process-wide instance.
#[derive(Clone, Default)]
pub struct DistributedClient {
    service: Option<RemoteHandle>,
}

impl DistributedClient {
    #[must_use]
    pub fn new(service: RemoteHandle) -> Self {
        Self {
            service: Some(service),
        }
    }

    /// A client with no service; every report fails with `Unavailable`.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { service: None }
    }
}

#[async_trait]
impl DirectoryServiceClient for DistributedClient {
    async fn report_completion(
        &self,
        origin_device_id: &str,
        session_id: i32,
        success: bool,
        reply: Option<RemoteHandle>,
    ) -> Result<(), ClientError> {
        let Some(service) = &self.service else {
            tracing::error!("distributed scheduler unavailable");
            return Err(ClientError::Unavailable);
        };

        let request = DirectoryRequest::NotifyCompleteContinuation {
            origin_device_id: origin_device_id.to_string(),
            session_id,
            success,
        };
        let mut data = Parcel::encode(DIRECTORY_INTERFACE, &request)?;
        if let Some(reply) = reply {
            data = data.with_object(reply);
        }

        tracing::info!(origin_device_id, session_id, success, "reporting continuation completion");
        let reply = service.send_request(data).await?;
        match PeerReply::from_parcel(&reply, DIRECTORY_INTERFACE)? {
            PeerReply::Ack | PeerReply::Accepted { ok: true } => Ok(()),
            PeerReply::Accepted { ok: false } => Err(ClientError::Rejected(codes::ERR_INVALID_VALUE)),
            PeerReply::Error { message } => {
                tracing::error!(%message, "distributed scheduler rejected completion notice");
                Err(ClientError::Rejected(codes::ERR_INVALID_VALUE))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use continuation_transport::{LocalBinder, ObjectId, RemoteStub, TransportError};

    use super::*;

    #[derive(Default)]
    struct FakeDirectory {
        seen: Mutex<Vec<(DirectoryRequest, Vec<ObjectId>)>>,
    }

    #[async_trait]
    impl RemoteStub for FakeDirectory {
        fn interface(&self) -> &'static str {
            DIRECTORY_INTERFACE
        }

        async fn on_remote_request(&self, data: Parcel) -> Result<Parcel, TransportError> {
            let request: DirectoryRequest = data.decode(DIRECTORY_INTERFACE)?;
            let objects = data.objects.iter().map(|o| o.id()).collect();
            self.seen.lock().unwrap().push((request, objects));
            PeerReply::Ack.into_parcel(DIRECTORY_INTERFACE)
        }
    }

    #[tokio::test]
    async fn test_report_completion_carries_reply_handle() {
        let directory = Arc::new(FakeDirectory::default());
        let client = DistributedClient::new(LocalBinder::new(directory.clone()));
        let replica: RemoteHandle = LocalBinder::new(Arc::new(FakeDirectory::default()));

        tokio_test::assert_ok!(
            client
                .report_completion("deviceA", 9, true, Some(Arc::clone(&replica)))
                .await
        );

        let seen = directory.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            DirectoryRequest::NotifyCompleteContinuation {
                origin_device_id: "deviceA".to_string(),
                session_id: 9,
                success: true,
            }
        );
        assert_eq!(seen[0].1, vec![replica.id()]);
    }

    #[tokio::test]
    async fn test_disconnected_client_is_unavailable() {
        let client = DistributedClient::disconnected();
        let err = tokio_test::assert_err!(client.report_completion("d", 0, false, None).await);
        assert!(matches!(err, ClientError::Unavailable));
    }

    #[tokio::test]
    async fn test_dead_service_is_transport_error() {
        let binder = LocalBinder::new(Arc::new(FakeDirectory::default()));
        let client = DistributedClient::new(binder.clone());
        binder.kill();

        let err = tokio_test::assert_err!(client.report_completion("d", 0, true, None).await);
        assert!(matches!(err, ClientError::Transport(TransportError::DeadObject(_))));
    }
}
