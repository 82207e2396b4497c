//! Inbound call adapter.
//!
//! Peer and directory-service calls arrive on transport threads. The
//! adapter re-posts each one onto the ability's task queue and returns as
//! soon as it is queued; the actual handling runs later, in order, on the
//! queue.

use std::{
    future::Future,
    sync::{Arc, Weak},
};

use continuation_core::StateBag;
use continuation_transport::{
    AbilityScheduler, PrimaryScheduler, RemoteHandle, ReplicaScheduler, TransportError,
};

use crate::{ability::AbilityContinuation, queue::TaskQueue};

/// Routes every inbound interface of one ability onto its task queue.
///
/// Holds only a weak reference, so a torn-down ability is never revived by
/// a late call.
pub struct SchedulerDispatch {
    ability: Weak<AbilityContinuation>,
    queue: TaskQueue,
}

impl SchedulerDispatch {
    #[must_use]
    pub const fn new(ability: Weak<AbilityContinuation>, queue: TaskQueue) -> Self {
        Self { ability, queue }
    }

    /// Queue `handler` against the ability.
    fn dispatch<F, Fut>(&self, call: &'static str, handler: F) -> Result<(), TransportError>
    where
        F: FnOnce(Arc<AbilityContinuation>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ability = self.ability.clone();
        self.queue
            .post(async move {
                match ability.upgrade() {
                    Some(ability) => handler(ability).await,
                    None => tracing::warn!(call, "ability gone, inbound call dropped"),
                }
            })
            .map_err(|e| {
                tracing::warn!(call, queue = %self.queue.name(), "inbound call dropped: {e}");
                e.into()
            })
    }
}

impl AbilityScheduler for SchedulerDispatch {
    fn continue_ability(&self, device_id: String) -> Result<(), TransportError> {
        tracing::info!(%device_id, "continue ability requested");
        self.dispatch("continue_ability", move |ability| async move {
            if let Err(e) = ability.continue_ability_with_stack(&device_id) {
                tracing::error!("continue ability failed: {e}");
            }
        })
    }

    fn notify_continuation_result(&self, result: i32) -> Result<(), TransportError> {
        self.dispatch("notify_continuation_result", move |ability| async move {
            ability.coordinator().on_remote_completion_notice(result);
        })
    }

    fn receive_replica_scheduler(&self, replica: RemoteHandle) -> Result<(), TransportError> {
        self.dispatch("receive_replica_scheduler", move |ability| async move {
            ability.coordinator().on_receive_replica_peer(replica).await;
        })
    }
}

impl PrimaryScheduler for SchedulerDispatch {
    fn notify_replica_terminated(&self) -> Result<(), TransportError> {
        self.dispatch("notify_replica_terminated", |ability| async move {
            ability.coordinator().on_peer_terminated();
        })
    }

    fn continuation_back(&self, state: StateBag) -> Result<bool, TransportError> {
        self.dispatch("continuation_back", move |ability| async move {
            ability.coordinator().on_reversal_data_received(state).await;
        })?;
        Ok(true)
    }
}

impl ReplicaScheduler for SchedulerDispatch {
    fn pass_primary(&self, primary: RemoteHandle) -> Result<(), TransportError> {
        self.dispatch("pass_primary", move |ability| async move {
            ability.coordinator().on_receive_primary_peer(primary);
        })
    }

    fn reverse_continuation(&self) -> Result<bool, TransportError> {
        self.dispatch("reverse_continuation", |ability| async move {
            ability.coordinator().request_reversal().await;
        })?;
        Ok(true)
    }

    fn notify_reverse_result(&self, result: i32) -> Result<(), TransportError> {
        self.dispatch("notify_reverse_result", move |ability| async move {
            ability.coordinator().on_reversal_result_received(result);
        })
    }
}

impl std::fmt::Debug for SchedulerDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerDispatch")
            .field("queue", &self.queue)
            .field("alive", &(self.ability.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use continuation_core::{AbilityDescriptor, MigrationEnvelope, StateBag, codes};
    use continuation_transport::AbilitySchedulerProxy;

    use super::*;
    use crate::{
        coordinator::RoleKind,
        test_support::{Mocks, continuation},
    };

    #[tokio::test]
    async fn test_completion_notice_is_posted_to_queue() {
        let mocks = Mocks::default();
        let ability = continuation(&mocks);
        let proxy = AbilitySchedulerProxy::new(ability.scheduler_handle());

        tokio_test::assert_ok!(proxy.notify_continuation_result(codes::ERR_OK).await);
        ability.queue().call(async {}).await.unwrap();

        assert_eq!(*mocks.callback.completed.lock().unwrap(), vec![codes::ERR_OK]);
    }

    #[tokio::test]
    async fn test_closed_queue_fails_loudly() {
        let mocks = Mocks::default();
        let ability = continuation(&mocks);
        let proxy = AbilitySchedulerProxy::new(ability.scheduler_handle());
        ability.shutdown();

        let err = tokio_test::assert_err!(proxy.notify_continuation_result(codes::ERR_OK).await);
        assert!(matches!(err, TransportError::Dispatch(_)));
        assert!(mocks.callback.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_after_ability_dropped_is_ignored() {
        let mocks = Mocks::default();
        let ability = continuation(&mocks);
        let queue = ability.queue().clone();
        let proxy = AbilitySchedulerProxy::new(ability.scheduler_handle());
        drop(ability);

        tokio_test::assert_ok!(proxy.notify_continuation_result(codes::ERR_OK).await);
        queue.call(async {}).await.unwrap();

        assert!(mocks.callback.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_continue_ability_uses_stack_path() {
        let mocks = Mocks::default();
        let ability = continuation(&mocks);
        let proxy = AbilitySchedulerProxy::new(ability.scheduler_handle());

        tokio_test::assert_ok!(proxy.continue_ability("deviceB").await);
        // One hop to queue the request, one more for the migration it posts.
        ability.queue().call(async {}).await.unwrap();
        ability.queue().call(async {}).await.unwrap();

        let calls = mocks.ability_manager.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.descriptor.device_id, "deviceB");
        assert_eq!(calls[0].1, codes::ERR_OK);
    }

    #[tokio::test]
    async fn test_replica_scheduler_wires_both_peers() {
        let primary_mocks = Mocks::default();
        let primary = continuation(&primary_mocks);
        let replica_mocks = Mocks::default();
        let replica = continuation(&replica_mocks);

        let descriptor = AbilityDescriptor::new("com.example.notes", "entry", "MainAbility");
        let envelope = MigrationEnvelope::continuation(&descriptor, "deviceB", StateBag::new(), true);
        assert!(tokio_test::assert_ok!(replica.handle_create_as_continuation(envelope).await));
        let replica_handle = replica.replica_handle().unwrap();

        let proxy = AbilitySchedulerProxy::new(primary.scheduler_handle());
        tokio_test::assert_ok!(proxy.receive_replica_scheduler(Arc::clone(&replica_handle)).await);
        primary.queue().call(async {}).await.unwrap();
        replica.queue().call(async {}).await.unwrap();

        assert_eq!(primary.coordinator().role(), RoleKind::Primary);
        assert_eq!(primary.coordinator().replica_peer(), Some(replica_handle.id()));
        assert_eq!(replica.coordinator().role(), RoleKind::Replica);
        assert_eq!(
            replica.coordinator().primary_peer(),
            Some(primary.primary_handle().id())
        );
        assert_eq!(primary_mocks.callback.peer_gone.load(Ordering::SeqCst), 0);
    }
}
