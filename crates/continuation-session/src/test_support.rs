//! Shared test doubles.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use continuation_core::{
    AbilityDescriptor, AbilityHost, AbilityToken, ContinuationCallback, MigrationEnvelope,
    StateBag,
};
use continuation_transport::{LocalTransport, ObjectId, RemoteHandle};

use crate::{
    ability::{AbilityContinuation, Collaborators},
    config::ContinuationConfig,
    distributed::{AbilityManagerClient, DirectoryServiceClient},
    error::ClientError,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct RecordingCallback {
    pub approve: AtomicBool,
    pub restore_ok: AtomicBool,
    pub state: Mutex<Option<StateBag>>,
    pub restored: Mutex<Vec<StateBag>>,
    pub completed: Mutex<Vec<i32>>,
    pub peer_gone: AtomicUsize,
}

impl Default for RecordingCallback {
    fn default() -> Self {
        Self {
            approve: AtomicBool::new(true),
            restore_ok: AtomicBool::new(true),
            state: Mutex::new(Some(StateBag::new().with("k", "v"))),
            restored: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            peer_gone: AtomicUsize::new(0),
        }
    }
}

impl ContinuationCallback for RecordingCallback {
    fn approve_start(&self) -> bool {
        self.approve.load(Ordering::SeqCst)
    }

    fn save_state(&self) -> Option<StateBag> {
        self.state.lock().unwrap().clone()
    }

    fn restore_state(&self, state: &StateBag) -> bool {
        self.restored.lock().unwrap().push(state.clone());
        self.restore_ok.load(Ordering::SeqCst)
    }

    fn complete_continuation(&self, result: i32) {
        self.completed.lock().unwrap().push(result);
    }

    fn notify_peer_gone(&self) {
        self.peer_gone.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct TestHost {
    pub terminated: AtomicUsize,
}

impl AbilityHost for TestHost {
    fn terminate_ability(&self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingAbilityManager {
    pub calls: Mutex<Vec<(MigrationEnvelope, i32)>>,
}

#[async_trait]
impl AbilityManagerClient for RecordingAbilityManager {
    async fn instantiate(
        &self,
        envelope: MigrationEnvelope,
        _token: AbilityToken,
        status: i32,
    ) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push((envelope, status));
        Ok(())
    }
}

pub type Report = (String, i32, bool, Option<ObjectId>);

#[derive(Default)]
pub struct RecordingDirectory {
    pub reports: Mutex<Vec<Report>>,
}

#[async_trait]
impl DirectoryServiceClient for RecordingDirectory {
    async fn report_completion(
        &self,
        origin_device_id: &str,
        session_id: i32,
        success: bool,
        reply: Option<RemoteHandle>,
    ) -> Result<(), ClientError> {
        self.reports.lock().unwrap().push((
            origin_device_id.to_string(),
            session_id,
            success,
            reply.map(|r| r.id()),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct Mocks {
    pub callback: Arc<RecordingCallback>,
    pub host: Arc<TestHost>,
    pub ability_manager: Arc<RecordingAbilityManager>,
    pub directory: Arc<RecordingDirectory>,
}

/// Continuation for a notes ability, bound over the in-process transport.
pub fn continuation(mocks: &Mocks) -> Arc<AbilityContinuation> {
    AbilityContinuation::new(
        AbilityDescriptor::new("com.example.notes", "entry", "MainAbility"),
        Collaborators {
            callback: mocks.callback.clone(),
            host: mocks.host.clone(),
            ability_manager: mocks.ability_manager.clone(),
            directory: mocks.directory.clone(),
            binder: Arc::new(LocalTransport),
        },
        ContinuationConfig::default(),
    )
}
