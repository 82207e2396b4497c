//! Host-facing continuation facade for one ability instance.
//!
//! Wires the task queue, progress manager, coordinator and inbound stubs
//! together, and exposes the entry points the hosting ability calls.

use std::sync::{Arc, Mutex, PoisonError};

use continuation_core::{
    AbilityDescriptor, AbilityHost, AbilityToken, ContinuationCallback, MigrationEnvelope,
};
use continuation_transport::{
    AbilitySchedulerStub, PrimaryStub, RemoteHandle, ReplicaStub, StubBinder,
};

use crate::{
    config::ContinuationConfig,
    coordinator::Coordinator,
    dispatch::SchedulerDispatch,
    distributed::{AbilityManagerClient, DirectoryServiceClient},
    error::DispatchError,
    manager::{ContinuationManager, ContinuationState, ManagerError, ProgressState},
    queue::TaskQueue,
};

/// External collaborators of one ability's continuation machinery.
pub struct Collaborators {
    /// The ability's own continuation hooks.
    pub callback: Arc<dyn ContinuationCallback>,
    pub host: Arc<dyn AbilityHost>,
    pub ability_manager: Arc<dyn AbilityManagerClient>,
    pub directory: Arc<dyn DirectoryServiceClient>,
    /// Turns local stubs into handles a peer can call.
    pub binder: Arc<dyn StubBinder>,
}

/// Continuation support for one ability instance.
pub struct AbilityContinuation {
    token: AbilityToken,
    queue: TaskQueue,
    manager: Arc<ContinuationManager>,
    coordinator: Arc<Coordinator>,
    directory: Arc<dyn DirectoryServiceClient>,
    binder: Arc<dyn StubBinder>,
    dispatch: Arc<SchedulerDispatch>,
    scheduler_handle: RemoteHandle,
    primary_handle: RemoteHandle,
    replica_handle: Mutex<Option<RemoteHandle>>,
}

impl AbilityContinuation {
    /// Set up continuation for `descriptor`. Spawns the ability's task queue,
    /// so this must run inside a tokio runtime.
    #[must_use]
    pub fn new(
        descriptor: AbilityDescriptor,
        collaborators: Collaborators,
        config: ContinuationConfig,
    ) -> Arc<Self> {
        let Collaborators {
            callback,
            host,
            ability_manager,
            directory,
            binder,
        } = collaborators;

        let queue = TaskQueue::spawn(&config.queue_name);
        let manager = Arc::new(ContinuationManager::new(
            callback,
            Arc::clone(&host),
            queue.clone(),
            config,
        ));
        let managed: Arc<dyn ContinuationCallback> = manager.clone();
        let coordinator = Coordinator::new(
            descriptor,
            false,
            managed,
            host,
            ability_manager,
            queue.clone(),
        );
        tracing::debug!(ability = %coordinator.descriptor(), queue = %queue.name(), "continuation initialized");

        Arc::new_cyclic(|weak_self| {
            let dispatch = Arc::new(SchedulerDispatch::new(weak_self.clone(), queue.clone()));
            let scheduler_handle = binder.bind(Arc::new(AbilitySchedulerStub::new(dispatch.clone())));
            let primary_handle = binder.bind(Arc::new(PrimaryStub::new(dispatch.clone())));

            Self {
                token: AbilityToken::new(),
                queue,
                manager,
                coordinator,
                directory,
                binder,
                dispatch,
                scheduler_handle,
                primary_handle,
                replica_handle: Mutex::new(None),
            }
        })
    }

    #[must_use]
    pub const fn token(&self) -> AbilityToken {
        self.token
    }

    #[must_use]
    pub const fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    #[must_use]
    pub fn manager(&self) -> &ContinuationManager {
        &self.manager
    }

    #[must_use]
    pub const fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Handle the directory service uses to drive this ability.
    #[must_use]
    pub fn scheduler_handle(&self) -> RemoteHandle {
        Arc::clone(&self.scheduler_handle)
    }

    /// Primary-callable handle, sent to the replica of a reversible session.
    #[must_use]
    pub fn primary_handle(&self) -> RemoteHandle {
        Arc::clone(&self.primary_handle)
    }

    /// Replica-callable handle, present once created as a reversible replica.
    #[must_use]
    pub fn replica_handle(&self) -> Option<RemoteHandle> {
        self.replica_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn continuation_state(&self) -> ContinuationState {
        self.manager.continuation_state()
    }

    #[must_use]
    pub fn progress_state(&self) -> ProgressState {
        self.manager.progress_state()
    }

    #[must_use]
    pub fn original_device_id(&self) -> String {
        self.manager.original_device_id()
    }

    /// Continue this ability on `device_id`.
    ///
    /// The migration runs on the ability's queue; its outcome arrives later
    /// through the completion notice.
    ///
    /// # Errors
    /// Returns error if the request is not allowed in the current state or
    /// the queue is closed.
    pub fn continue_ability(&self, device_id: &str, reversible: bool) -> Result<(), ManagerError> {
        if device_id.is_empty() {
            return Err(ManagerError::EmptyDeviceId);
        }
        self.manager.begin_continuation(reversible)?;
        self.coordinator.set_reversible(reversible);
        self.coordinator
            .set_primary_stub(reversible.then(|| self.primary_handle()));

        let coordinator = Arc::clone(&self.coordinator);
        let manager = Arc::clone(&self.manager);
        let token = self.token;
        let device_id = device_id.to_string();
        let posted = self.queue.post(async move {
            if !coordinator.initiate_migration(token, &device_id).await {
                manager.abort_request();
            }
        });
        if let Err(e) = posted {
            self.manager.abort_request();
            return Err(e.into());
        }
        Ok(())
    }

    /// Continue using the ability's combined `on_continue` hook.
    ///
    /// # Errors
    /// Returns error on an empty device id or a closed queue.
    pub fn continue_ability_with_stack(&self, device_id: &str) -> Result<(), ManagerError> {
        if device_id.is_empty() {
            return Err(ManagerError::EmptyDeviceId);
        }
        self.coordinator
            .set_primary_stub(self.coordinator.is_reversible().then(|| self.primary_handle()));
        let coordinator = Arc::clone(&self.coordinator);
        let token = self.token;
        let device_id = device_id.to_string();
        self.queue.post(async move {
            coordinator
                .initiate_migration_with_stack(token, &device_id)
                .await;
        })?;
        Ok(())
    }

    /// Primary side: ask the replica to hand the ability back.
    ///
    /// The progress change happens in the same queue task as the request, so
    /// it is ordered before the replica's `continuation_back`.
    ///
    /// # Errors
    /// Returns error unless the ability is continued reversibly and idle.
    pub async fn reverse_continue_ability(&self) -> Result<bool, ManagerError> {
        self.manager.check_reverse_allowed()?;
        let coordinator = Arc::clone(&self.coordinator);
        let manager = Arc::clone(&self.manager);
        let sent = self
            .queue
            .call(async move {
                let sent = coordinator.request_peer_initiate_reversal().await;
                if sent {
                    manager.reverse_requested();
                }
                sent
            })
            .await?;
        Ok(sent)
    }

    /// Replica side: hand control back to the primary.
    ///
    /// # Errors
    /// Returns error if the queue is closed.
    pub async fn request_reversal(&self) -> Result<bool, DispatchError> {
        let coordinator = Arc::clone(&self.coordinator);
        self.queue
            .call(async move { coordinator.request_reversal().await })
            .await
    }

    /// Replica side: tell the primary this instance is going away.
    ///
    /// # Errors
    /// Returns error if the queue is closed.
    pub async fn notify_termination_to_primary(&self) -> Result<bool, DispatchError> {
        let coordinator = Arc::clone(&self.coordinator);
        self.queue
            .call(async move { coordinator.notify_termination_to_primary().await })
            .await
    }

    /// Finish creating this ability as the target of a continuation.
    ///
    /// Restores the envelope's state, publishes a replica handle when the
    /// session is reversible, and reports the outcome to the directory
    /// service. Returns whether the state was restored; an envelope that is
    /// not a continuation is ignored.
    ///
    /// # Errors
    /// Returns error if the queue is closed.
    pub async fn handle_create_as_continuation(
        &self,
        envelope: MigrationEnvelope,
    ) -> Result<bool, DispatchError> {
        if !envelope.is_continuation() {
            tracing::info!("not created as a continuation");
            return Ok(false);
        }
        let reversible = envelope.is_reversible();
        let MigrationEnvelope {
            state,
            session_id,
            origin_device_id,
            ..
        } = envelope;

        let manager = Arc::clone(&self.manager);
        let coordinator = Arc::clone(&self.coordinator);
        let origin = origin_device_id.clone();
        let restored = self
            .queue
            .call(async move {
                coordinator.set_reversible(reversible);
                manager.restore_data(&state, reversible, &origin)
            })
            .await?;

        let replica = reversible.then(|| {
            let handle = self
                .binder
                .bind(Arc::new(ReplicaStub::new(self.dispatch.clone())));
            *self
                .replica_handle
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&handle));
            handle
        });

        tracing::info!(%origin_device_id, session_id, restored, reversible, "created as continuation");
        if let Err(e) = self
            .directory
            .report_completion(&origin_device_id, session_id, restored, replica)
            .await
        {
            tracing::error!(%origin_device_id, session_id, "failed to report continuation completion: {e}");
        }
        Ok(restored)
    }

    /// Stop the ability's task queue. Later inbound calls fail with a
    /// dispatch error.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}

impl std::fmt::Debug for AbilityContinuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityContinuation")
            .field("token", &self.token)
            .field("coordinator", &self.coordinator)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}
