//! In-process binder transport.
//!
//! Wraps a [`RemoteStub`] so it can be handed to a peer as a
//! [`RemoteHandle`]. Used for same-device continuation and in tests; the
//! binder can be killed to simulate abrupt peer loss.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::remote::{
    DeathRecipient, ObjectId, Parcel, RemoteHandle, RemoteObject, RemoteStub, StubBinder,
    TransportError, same_recipient,
};

/// [`StubBinder`] producing [`LocalBinder`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl StubBinder for LocalTransport {
    fn bind(&self, stub: Arc<dyn RemoteStub>) -> RemoteHandle {
        LocalBinder::new(stub)
    }
}

/// In-process remote object backed by a stub.
pub struct LocalBinder {
    id: ObjectId,
    stub: Arc<dyn RemoteStub>,
    alive: AtomicBool,
    recipients: Mutex<Vec<Arc<dyn DeathRecipient>>>,
}

impl LocalBinder {
    /// Wrap `stub` into a new remote object.
    #[must_use]
    pub fn new(stub: Arc<dyn RemoteStub>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            stub,
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
        })
    }

    /// Mark the object dead and deliver death notices.
    ///
    /// Recipients are drained, so a second call delivers nothing.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let recipients = std::mem::take(
            &mut *self.recipients.lock().unwrap_or_else(PoisonError::into_inner),
        );
        tracing::debug!(object = %self.id, count = recipients.len(), "local binder died");
        for recipient in recipients {
            recipient.on_remote_died(self.id);
        }
    }

    /// Number of registered death recipients.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.recipients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl RemoteObject for LocalBinder {
    fn id(&self) -> ObjectId {
        self.id
    }

    async fn send_request(&self, data: Parcel) -> Result<Parcel, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::DeadObject(self.id));
        }
        if data.interface != self.stub.interface() {
            return Err(TransportError::InterfaceMismatch {
                expected: self.stub.interface().to_string(),
                found: data.interface,
            });
        }
        self.stub.on_remote_request(data).await
    }

    fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.recipients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recipient);
        true
    }

    fn remove_death_recipient(&self, recipient: &Arc<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock().unwrap_or_else(PoisonError::into_inner);
        let before = recipients.len();
        recipients.retain(|r| !same_recipient(r, recipient));
        recipients.len() != before
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}
