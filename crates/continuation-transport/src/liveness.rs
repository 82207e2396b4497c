//! Peer liveness monitoring.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::remote::{DeathRecipient, ObjectId, RemoteHandle, TransportError};

type DeathCallback = Box<dyn Fn(ObjectId) + Send + Sync>;

/// Death recipient that fires at most once, however many notices arrive.
struct OneShotRecipient {
    fired: AtomicBool,
    on_death: DeathCallback,
}

impl DeathRecipient for OneShotRecipient {
    fn on_remote_died(&self, object: ObjectId) {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!(%object, "duplicate death notice ignored");
            return;
        }
        (self.on_death)(object);
    }
}

/// A single death registration against one peer handle.
///
/// The registration is removed by [`unregister`](Self::unregister) or when
/// the monitor is dropped, whichever happens first.
pub struct LivenessMonitor {
    handle: RemoteHandle,
    recipient: Arc<dyn DeathRecipient>,
    registered: bool,
}

impl LivenessMonitor {
    /// Register `on_death` against `handle`.
    ///
    /// `on_death` runs on the transport's thread; it should only hand the
    /// notice off to the owner's execution context.
    ///
    /// # Errors
    /// Returns `DeadObject` if the handle is already dead.
    pub fn register<F>(handle: &RemoteHandle, on_death: F) -> Result<Self, TransportError>
    where
        F: Fn(ObjectId) + Send + Sync + 'static,
    {
        let recipient: Arc<dyn DeathRecipient> = Arc::new(OneShotRecipient {
            fired: AtomicBool::new(false),
            on_death: Box::new(on_death),
        });
        if !handle.add_death_recipient(Arc::clone(&recipient)) {
            return Err(TransportError::DeadObject(handle.id()));
        }
        tracing::debug!(handle = %handle.id(), "liveness registration installed");
        Ok(Self {
            handle: Arc::clone(handle),
            recipient,
            registered: true,
        })
    }

    /// Id of the watched handle.
    #[must_use]
    pub fn watched(&self) -> ObjectId {
        self.handle.id()
    }

    /// Remove the registration.
    pub fn unregister(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        self.handle.remove_death_recipient(&self.recipient);
        tracing::debug!(handle = %self.handle.id(), "liveness registration removed");
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("watched", &self.handle.id())
            .field("registered", &self.registered)
            .finish()
    }
}

#[cfg(all(test, feature = "local"))]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        local::LocalBinder,
        protocol::PeerReply,
        remote::{Parcel, RemoteObject, RemoteStub},
    };

    struct Echo;

    #[async_trait]
    impl RemoteStub for Echo {
        fn interface(&self) -> &'static str {
            "test.echo"
        }

        async fn on_remote_request(&self, _data: Parcel) -> Result<Parcel, TransportError> {
            PeerReply::Ack.into_parcel("test.echo")
        }
    }

    #[test]
    fn test_death_fires_once() {
        let binder = LocalBinder::new(Arc::new(Echo));
        let handle: RemoteHandle = binder.clone();
        let deaths = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&deaths);

        let monitor = LivenessMonitor::register(&handle, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(monitor.watched(), binder.id());

        // deliver the same notice twice through the registered recipient
        let recipient = Arc::clone(&monitor.recipient);
        binder.kill();
        recipient.on_remote_died(binder.id());

        assert_eq!(deaths.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_and_drop_remove_recipient() {
        let binder = LocalBinder::new(Arc::new(Echo));
        let handle: RemoteHandle = binder.clone();

        let monitor = LivenessMonitor::register(&handle, |_| {}).unwrap();
        assert_eq!(binder.recipient_count(), 1);
        monitor.unregister();
        assert_eq!(binder.recipient_count(), 0);

        {
            let _monitor = LivenessMonitor::register(&handle, |_| {}).unwrap();
            assert_eq!(binder.recipient_count(), 1);
        }
        assert_eq!(binder.recipient_count(), 0);
    }

    #[test]
    fn test_register_on_dead_handle_fails() {
        let binder = LocalBinder::new(Arc::new(Echo));
        let handle: RemoteHandle = binder.clone();
        binder.kill();

        let result = LivenessMonitor::register(&handle, |_| {});
        assert!(matches!(result, Err(TransportError::DeadObject(_))));
    }
}
