//! Per-ability continuation state machine.
//!
//! The coordinator owns at most one session and is the only component that
//! talks to the ability's [`ContinuationCallback`]. All methods are expected
//! to run on the ability's [`TaskQueue`]; inbound calls reach them through
//! [`SchedulerDispatch`](crate::SchedulerDispatch).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use continuation_core::{
    AbilityDescriptor, AbilityHost, AbilityToken, ContinuationCallback, MigrationEnvelope,
    StateBag, codes,
};
use continuation_transport::{
    LivenessMonitor, ObjectId, PrimaryProxy, RemoteHandle, ReplicaProxy,
};

use crate::{
    distributed::AbilityManagerClient,
    error::{ContinuationError, FailureKind},
    queue::TaskQueue,
};

/// Which side of a session this ability is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    /// No peer is known.
    Idle,
    /// This ability migrated away and holds the replica's handle.
    Primary,
    /// This ability was created by a migration and holds the primary's handle.
    Replica,
}

/// Session peer state. The variant is the role, so a primary can never hold
/// a primary peer and vice versa.
enum Role {
    Idle,
    Primary {
        replica: ReplicaProxy,
        liveness: LivenessMonitor,
    },
    Replica {
        primary: PrimaryProxy,
    },
}

impl Role {
    const fn kind(&self) -> RoleKind {
        match self {
            Self::Idle => RoleKind::Idle,
            Self::Primary { .. } => RoleKind::Primary,
            Self::Replica { .. } => RoleKind::Replica,
        }
    }
}

struct Session {
    role: Role,
    reversible: bool,
    primary_stub: Option<RemoteHandle>,
    last_error: Option<FailureKind>,
}

/// Continuation coordinator for one ability instance.
pub struct Coordinator {
    descriptor: AbilityDescriptor,
    callback: Arc<dyn ContinuationCallback>,
    host: Arc<dyn AbilityHost>,
    ability_manager: Arc<dyn AbilityManagerClient>,
    queue: TaskQueue,
    session: Mutex<Session>,
    weak_self: Weak<Self>,
}

impl Coordinator {
    /// Create a coordinator. The descriptor's device info is scrubbed.
    #[must_use]
    pub fn new(
        mut descriptor: AbilityDescriptor,
        reversible: bool,
        callback: Arc<dyn ContinuationCallback>,
        host: Arc<dyn AbilityHost>,
        ability_manager: Arc<dyn AbilityManagerClient>,
        queue: TaskQueue,
    ) -> Arc<Self> {
        descriptor.clear_device_info();
        Arc::new_cyclic(|weak_self| Self {
            descriptor,
            callback,
            host,
            ability_manager,
            queue,
            session: Mutex::new(Session {
                role: Role::Idle,
                reversible,
                primary_stub: None,
                last_error: None,
            }),
            weak_self: weak_self.clone(),
        })
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The ability this coordinator serves.
    #[must_use]
    pub const fn descriptor(&self) -> &AbilityDescriptor {
        &self.descriptor
    }

    /// Current role.
    #[must_use]
    pub fn role(&self) -> RoleKind {
        self.session().role.kind()
    }

    /// Handle id of the replica peer, when acting as primary.
    #[must_use]
    pub fn replica_peer(&self) -> Option<ObjectId> {
        match &self.session().role {
            Role::Primary { replica, .. } => Some(replica.remote().id()),
            _ => None,
        }
    }

    /// Handle id of the primary peer, when acting as replica.
    #[must_use]
    pub fn primary_peer(&self) -> Option<ObjectId> {
        match &self.session().role {
            Role::Replica { primary } => Some(primary.remote().id()),
            _ => None,
        }
    }

    /// Handle id currently watched for death, if any.
    #[must_use]
    pub fn watched_peer(&self) -> Option<ObjectId> {
        match &self.session().role {
            Role::Primary { liveness, .. } => Some(liveness.watched()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.session().reversible
    }

    pub fn set_reversible(&self, reversible: bool) {
        tracing::debug!(reversible, "set reversible");
        self.session().reversible = reversible;
    }

    /// Install this device's primary-callable handle, sent to the replica on
    /// [`on_receive_replica_peer`](Self::on_receive_replica_peer). Only a
    /// reversible continuation carries one.
    pub fn set_primary_stub(&self, stub: Option<RemoteHandle>) {
        self.session().primary_stub = stub;
    }

    #[must_use]
    pub fn primary_stub(&self) -> Option<ObjectId> {
        self.session().primary_stub.as_ref().map(|stub| stub.id())
    }

    /// Class of the most recent failure, if the last operation failed.
    #[must_use]
    pub fn last_error(&self) -> Option<FailureKind> {
        self.session().last_error
    }

    fn settle(&self, op: &str, result: Result<(), ContinuationError>) -> bool {
        match result {
            Ok(()) => {
                self.session().last_error = None;
                true
            }
            Err(e) => {
                tracing::error!(op, ability = %self.descriptor, kind = ?e.kind(), "{e}");
                self.session().last_error = Some(e.kind());
                false
            }
        }
    }

    fn check_available(&self) -> Result<(), ContinuationError> {
        if self.host.lifecycle_state().accepts_continuation() {
            Ok(())
        } else {
            Err(ContinuationError::AbilityUnavailable)
        }
    }

    fn prepare_state(&self) -> Result<StateBag, ContinuationError> {
        self.check_available()?;
        if !self.callback.approve_start() {
            tracing::info!(ability = %self.descriptor, "ability rejected continuation");
            return Err(ContinuationError::Refused(codes::CONTINUE_ABILITY_REJECTED));
        }
        self.callback
            .save_state()
            .ok_or(ContinuationError::Refused(codes::CONTINUE_SAVE_DATA_FAILED))
    }

    fn check_migration_args(&self, target_device: &str) -> Result<(), ContinuationError> {
        if !self.descriptor.is_complete() {
            return Err(ContinuationError::InvalidArgument("ability descriptor".to_string()));
        }
        if target_device.is_empty() {
            return Err(ContinuationError::InvalidArgument("target device".to_string()));
        }
        Ok(())
    }

    /// Migrate this ability to `target_device`.
    ///
    /// Fails closed: nothing is sent unless the ability approves and saves.
    pub async fn initiate_migration(&self, token: AbilityToken, target_device: &str) -> bool {
        let result = self.try_initiate_migration(token, target_device).await;
        self.settle("initiate_migration", result)
    }

    async fn try_initiate_migration(
        &self,
        token: AbilityToken,
        target_device: &str,
    ) -> Result<(), ContinuationError> {
        tracing::debug!(ability = %self.descriptor, target_device, "initiate migration");
        self.check_migration_args(target_device)?;
        let state = self.prepare_state()?;

        let envelope =
            MigrationEnvelope::continuation(&self.descriptor, target_device, state, self.is_reversible());
        self.ability_manager
            .instantiate(envelope, token, codes::ERR_OK)
            .await?;
        tracing::info!(ability = %self.descriptor, target_device, "continuation started");
        Ok(())
    }

    /// Migrate using the combined `on_continue` callback.
    ///
    /// The ability manager is always told, carrying the preparation status.
    pub async fn initiate_migration_with_stack(
        &self,
        token: AbilityToken,
        target_device: &str,
    ) -> bool {
        let result = self
            .try_initiate_migration_with_stack(token, target_device)
            .await;
        self.settle("initiate_migration_with_stack", result)
    }

    async fn try_initiate_migration_with_stack(
        &self,
        token: AbilityToken,
        target_device: &str,
    ) -> Result<(), ContinuationError> {
        self.check_migration_args(target_device)?;
        self.check_available()?;

        let (state, status) = match self.callback.on_continue() {
            Ok(state) => (state, codes::ERR_OK),
            Err(status) => {
                let status = match status {
                    codes::CONTINUE_ABILITY_REJECTED | codes::CONTINUE_SAVE_DATA_FAILED => status,
                    _ => codes::CONTINUE_ON_CONTINUE_FAILED,
                };
                tracing::info!(ability = %self.descriptor, status, "on_continue failed");
                (StateBag::new(), status)
            }
        };

        let envelope =
            MigrationEnvelope::continuation(&self.descriptor, target_device, state, self.is_reversible());
        self.ability_manager.instantiate(envelope, token, status).await?;
        Ok(())
    }

    /// Primary side: the replica's handle arrived.
    ///
    /// Replaces any previous replica (its liveness registration is removed
    /// first), watches the new one and sends back this device's handle.
    pub async fn on_receive_replica_peer(&self, peer: RemoteHandle) {
        let result = self.try_receive_replica_peer(peer).await;
        self.settle("on_receive_replica_peer", result);
    }

    async fn try_receive_replica_peer(&self, peer: RemoteHandle) -> Result<(), ContinuationError> {
        let (replica, primary_stub) = {
            let mut session = self.session();
            if matches!(session.role, Role::Replica { .. }) {
                return Err(ContinuationError::WrongRole("replica"));
            }

            if let Role::Primary { liveness, .. } = std::mem::replace(&mut session.role, Role::Idle) {
                liveness.unregister();
            }

            let liveness = LivenessMonitor::register(&peer, self.death_handler())?;
            let replica = ReplicaProxy::new(peer);
            session.role = Role::Primary {
                replica: replica.clone(),
                liveness,
            };
            (replica, session.primary_stub.clone())
        };
        tracing::info!(replica = %replica.remote().id(), "replica peer installed");

        let Some(stub) = primary_stub else {
            tracing::warn!("no primary stub installed, replica cannot call back");
            return Ok(());
        };
        replica.pass_primary(stub).await?;
        Ok(())
    }

    fn death_handler(&self) -> impl Fn(ObjectId) + Send + Sync + 'static {
        let weak = self.weak_self.clone();
        let queue = self.queue.clone();
        move |object| {
            let weak = weak.clone();
            let posted = queue.post(async move {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.on_replica_died(object);
                }
            });
            if let Err(e) = posted {
                tracing::warn!(%object, "replica death notice dropped: {e}");
            }
        }
    }

    fn on_replica_died(&self, object: ObjectId) {
        if self.watched_peer() != Some(object) {
            tracing::warn!(%object, "death notice for a handle that is not the current replica");
            return;
        }
        tracing::info!(%object, "replica died");
        self.on_peer_terminated();
    }

    /// Replica side: the primary's handle arrived.
    pub fn on_receive_primary_peer(&self, peer: RemoteHandle) {
        let mut session = self.session();
        if matches!(session.role, Role::Primary { .. }) {
            tracing::error!(primary = %peer.id(), "primary handle received while acting as primary");
            session.last_error = Some(FailureKind::NoPeer);
            return;
        }
        tracing::info!(primary = %peer.id(), "primary peer installed");
        session.role = Role::Replica {
            primary: PrimaryProxy::new(peer),
        };
        session.last_error = None;
    }

    /// Completion notice from the directory service. Session state is untouched.
    pub fn on_remote_completion_notice(&self, result: i32) {
        tracing::info!(result, "continuation completion notice");
        self.callback.complete_continuation(result);
    }

    /// Replica side: hand control back to the primary.
    pub async fn request_reversal(&self) -> bool {
        let result = self.try_request_reversal().await;
        self.settle("request_reversal", result)
    }

    async fn try_request_reversal(&self) -> Result<(), ContinuationError> {
        let primary = match &self.session().role {
            Role::Replica { primary } => primary.clone(),
            _ => return Err(ContinuationError::NoPeer("primary")),
        };
        let state = self.prepare_state()?;

        if primary.continuation_back(state).await? {
            tracing::info!("continuation back sent");
            Ok(())
        } else {
            Err(ContinuationError::RemoteRefused(codes::ERR_INVALID_VALUE))
        }
    }

    /// Primary side: the replica handed control back with `state`.
    ///
    /// Always reports the restore outcome to the replica. The session is torn
    /// down only when the restore succeeded, so a failed restore can be retried.
    pub async fn on_reversal_data_received(&self, state: StateBag) -> bool {
        let result = self.try_reversal_data_received(state).await;
        self.settle("on_reversal_data_received", result)
    }

    async fn try_reversal_data_received(&self, state: StateBag) -> Result<(), ContinuationError> {
        let replica = match &self.session().role {
            Role::Primary { replica, .. } => replica.clone(),
            _ => return Err(ContinuationError::NoPeer("replica")),
        };

        let restored = self.callback.restore_state(&state);
        let result = if restored {
            codes::ERR_OK
        } else {
            tracing::info!("restore from remote failed");
            codes::ABILITY_FAILED_RESTORE_DATA
        };

        if let Err(e) = replica.notify_reverse_result(result).await {
            tracing::error!("failed to notify reverse result: {e}");
        }
        if restored {
            self.clean_up_after_reverse();
            Ok(())
        } else {
            Err(ContinuationError::Refused(result))
        }
    }

    /// Replica side: outcome of the primary's restore.
    pub fn on_reversal_result_received(&self, result: i32) {
        tracing::info!(result, "reverse result received");
        {
            let mut session = self.session();
            if !matches!(session.role, Role::Replica { .. }) {
                tracing::warn!("reverse result received while not acting as replica");
                return;
            }
            if !codes::is_ok(result) {
                return;
            }
            session.role = Role::Idle;
        }
        self.host.terminate_ability();
    }

    /// The peer is gone. Tears the session down and tells the ability once.
    pub fn on_peer_terminated(&self) {
        if self.clean_up_after_reverse() {
            self.callback.notify_peer_gone();
        } else {
            tracing::debug!("peer terminated with no live session");
        }
    }

    /// Clear the peer and its liveness registration. Returns whether a peer
    /// was present.
    fn clean_up_after_reverse(&self) -> bool {
        let previous = std::mem::replace(&mut self.session().role, Role::Idle);
        match previous {
            Role::Idle => false,
            Role::Primary { replica, liveness } => {
                liveness.unregister();
                tracing::info!(replica = %replica.remote().id(), "session torn down");
                true
            }
            Role::Replica { primary } => {
                tracing::info!(primary = %primary.remote().id(), "session torn down");
                true
            }
        }
    }

    /// Primary side: ask the replica to start a reversal from its side.
    pub async fn request_peer_initiate_reversal(&self) -> bool {
        let result = self.try_request_peer_initiate_reversal().await;
        self.settle("request_peer_initiate_reversal", result)
    }

    async fn try_request_peer_initiate_reversal(&self) -> Result<(), ContinuationError> {
        let replica = match &self.session().role {
            Role::Primary { replica, .. } => replica.clone(),
            _ => return Err(ContinuationError::NoPeer("replica")),
        };
        if replica.reverse_continuation().await? {
            Ok(())
        } else {
            Err(ContinuationError::RemoteRefused(codes::ERR_INVALID_VALUE))
        }
    }

    /// Replica side: tell the primary this replica is going away.
    pub async fn notify_termination_to_primary(&self) -> bool {
        let result = self.try_notify_termination_to_primary().await;
        self.settle("notify_termination_to_primary", result)
    }

    async fn try_notify_termination_to_primary(&self) -> Result<(), ContinuationError> {
        let primary = match &self.session().role {
            Role::Replica { primary } => primary.clone(),
            _ => return Err(ContinuationError::NoPeer("primary")),
        };
        primary.notify_replica_terminated().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("descriptor", &self.descriptor)
            .field("role", &self.role())
            .field("reversible", &self.is_reversible())
            .finish_non_exhaustive()
    }
}
