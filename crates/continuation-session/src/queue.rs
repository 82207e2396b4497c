//! Single-threaded execution context for one ability.
//!
//! Every continuation state transition runs as a task on the ability's
//! queue, one at a time and in post order.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::error::DispatchError;

enum Job {
    Run(BoxFuture<'static, ()>),
    Stop,
}

/// Handle to an ability's task queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
    closed: Arc<AtomicBool>,
    delayed: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TaskQueue {
    /// Spawn the queue's runner on the current tokio runtime.
    #[must_use]
    pub fn spawn(name: &str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let closed = Arc::new(AtomicBool::new(false));

        let runner_name = name.to_string();
        let runner_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Run(task) => task.await,
                    Job::Stop => break,
                }
            }
            runner_closed.store(true, Ordering::SeqCst);
            tracing::debug!(queue = %runner_name, "task queue stopped");
        });

        Self {
            name: Arc::from(name),
            tx,
            closed,
            delayed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the queue still accepts tasks.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Enqueue a task and return immediately.
    ///
    /// # Errors
    /// Returns `QueueClosed` once the queue has been shut down.
    pub fn post<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DispatchError::QueueClosed);
        }
        self.tx
            .send(Job::Run(Box::pin(task)))
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Run `task` on the queue and wait for its output.
    ///
    /// Must not be awaited from a task already running on this queue.
    ///
    /// # Errors
    /// Returns error if the queue is closed or stops before the task runs.
    pub async fn call<F, T>(&self, task: F) -> Result<T, DispatchError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(async move {
            let _ = reply_tx.send(task.await);
        })?;
        reply_rx.await.map_err(|_| DispatchError::TaskDropped)
    }

    /// Enqueue `task` after `delay`, under `name`.
    ///
    /// A pending task with the same name is cancelled first.
    pub fn post_delayed<F>(&self, name: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queue = self.clone();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.post(task) {
                tracing::warn!(queue = %queue.name, task = %task_name, "delayed task dropped: {e}");
            }
        });

        let mut delayed = self.delayed.lock().unwrap_or_else(PoisonError::into_inner);
        delayed.retain(|_, h| !h.is_finished());
        if let Some(previous) = delayed.insert(name.to_string(), handle) {
            previous.abort();
        }
    }

    /// Cancel a pending delayed task. Returns whether one was pending.
    pub fn remove_task(&self, name: &str) -> bool {
        let handle = self
            .delayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match handle {
            Some(h) if !h.is_finished() => {
                h.abort();
                true
            }
            _ => false,
        }
    }

    /// Stop the runner after already-queued tasks and refuse new ones.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Job::Stop);
        for (_, handle) in self
            .delayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
        {
            handle.abort();
        }
        tracing::debug!(queue = %self.name, "task queue shut down");
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
