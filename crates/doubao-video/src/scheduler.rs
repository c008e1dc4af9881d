// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background retrieval of generated videos.
//!
//! Each submitted task gets one detached job: wait out the warm-up, then ask
//! the oracle until it reports links or the attempt budget is spent. Every
//! state change is written to the task store before the job moves on, so a
//! status query never sees a state the job has already left behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use doubao_core::{DoubaoError, TaskKey, TaskStore, VideoOracle, VideoTask};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::schedule::RetrySchedule;

struct Job {
    id: u64,
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

enum Entry {
    /// Claimed by a caller that has not spawned the job yet.
    Reserved,
    Running(Job),
}

impl Entry {
    fn is_live(&self) -> bool {
        match self {
            Entry::Reserved => true,
            Entry::Running(job) => !job.handle.is_finished(),
        }
    }
}

/// Exclusive claim on a key in the job registry.
///
/// Dropping it without [`VideoRetryScheduler::spawn`] releases the key.
struct Reservation<'a> {
    inner: &'a Inner,
    key: TaskKey,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut jobs) = self.inner.jobs() {
            if matches!(jobs.get(&self.key), Some(Entry::Reserved)) {
                jobs.remove(&self.key);
            }
        }
    }
}

struct Inner {
    store: Arc<dyn TaskStore>,
    oracle: Arc<dyn VideoOracle>,
    schedule: RetrySchedule,
    jobs: Mutex<HashMap<TaskKey, Entry>>,
    next_job: AtomicU64,
    cancel: CancellationToken,
}

impl Inner {
    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<TaskKey, Entry>>, DoubaoError> {
        self.jobs
            .lock()
            .map_err(|_| DoubaoError::Internal("job registry lock poisoned".into()))
    }

    async fn save(&self, task: &VideoTask) {
        if let Err(e) = self.store.save(task).await {
            warn!(task = %task.key(), error = %e, "failed to persist video task");
        }
    }

    /// Sleeps for `duration` unless shutdown starts first. Returns `false` on
    /// shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Drives video tasks to a terminal state in the background.
///
/// Cloning is cheap; clones share the job registry.
#[derive(Clone)]
pub struct VideoRetryScheduler {
    inner: Arc<Inner>,
}

impl VideoRetryScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        oracle: Arc<dyn VideoOracle>,
        schedule: RetrySchedule,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                oracle,
                schedule,
                jobs: Mutex::new(HashMap::new()),
                next_job: AtomicU64::new(0),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn schedule(&self) -> &RetrySchedule {
        &self.inner.schedule
    }

    /// Starts retrieval for `key` and returns the task as first persisted.
    ///
    /// A stored task for the key is reused. A terminal task is returned as is
    /// and a key whose job is already running, or being started by a
    /// concurrent call, is not started twice.
    pub async fn submit(&self, key: TaskKey) -> Result<VideoTask, DoubaoError> {
        if self.inner.cancel.is_cancelled() {
            return Err(DoubaoError::Internal("scheduler is shut down".into()));
        }

        let Some(reservation) = self.reserve(&key)? else {
            debug!(task = %key, "job already running");
            let stored = self.inner.store.get(&key).await?;
            return Ok(stored
                .unwrap_or_else(|| VideoTask::new(key, self.inner.schedule.max_retries)));
        };

        let existing = self.inner.store.get(&key).await?;
        if let Some(task) = &existing {
            if task.status.is_terminal() {
                debug!(task = %key, status = %task.status, "task already finished");
                return Ok(task.clone());
            }
        }

        let fresh = existing.is_none();
        let task =
            existing.unwrap_or_else(|| VideoTask::new(key.clone(), self.inner.schedule.max_retries));
        self.inner.store.save(&task).await?;

        let delay = if fresh || task.retry_count == 0 {
            self.inner.schedule.warmup
        } else {
            self.inner.schedule.retry_interval
        };
        self.spawn(reservation, task.clone(), delay)?;
        info!(
            task = %key,
            max_retries = task.max_retries,
            warmup_secs = delay.as_secs(),
            "video retrieval scheduled"
        );
        Ok(task)
    }

    /// The stored task for `key`.
    pub async fn get(&self, key: &TaskKey) -> Result<VideoTask, DoubaoError> {
        self.inner
            .store
            .get(key)
            .await?
            .ok_or_else(|| DoubaoError::TaskNotFound {
                conversation_id: key.conversation_id.clone(),
                message_id: key.message_id.clone(),
            })
    }

    pub async fn list_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<VideoTask>, DoubaoError> {
        self.inner.store.list_by_conversation(conversation_id).await
    }

    pub async fn list_all(&self) -> Result<Vec<VideoTask>, DoubaoError> {
        self.inner.store.list_all().await
    }

    /// Keys whose job is still running, sorted.
    pub fn active_jobs(&self) -> Result<Vec<TaskKey>, DoubaoError> {
        let jobs = self.inner.jobs()?;
        let mut keys: Vec<TaskKey> = jobs
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Running(job) if !job.handle.is_finished()))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Restarts jobs for tasks left non-terminal by a previous process.
    ///
    /// Tasks whose budget is already spent are marked failed instead. Returns
    /// the keys whose jobs were restarted.
    pub async fn resume_incomplete(&self) -> Result<Vec<TaskKey>, DoubaoError> {
        let mut resumed = Vec::new();
        for mut task in self.inner.store.list_all().await? {
            if task.status.is_terminal() {
                continue;
            }
            let key = task.key();
            let Some(reservation) = self.reserve(&key)? else {
                continue;
            };
            if !task.has_attempts_left() {
                task.fail();
                self.inner.store.save(&task).await?;
                warn!(task = %key, retry_count = task.retry_count, "stale task marked failed");
                continue;
            }

            let delay = if task.retry_count == 0 {
                self.inner.schedule.warmup
            } else {
                self.inner.schedule.retry_interval
            };
            self.spawn(reservation, task, delay)?;
            resumed.push(key);
        }
        if !resumed.is_empty() {
            info!(count = resumed.len(), "resumed incomplete video tasks");
        }
        Ok(resumed)
    }

    /// Waits for the job of `key` to end. Returns at once if none is running.
    pub async fn wait_for(&self, key: &TaskKey) -> Result<(), DoubaoError> {
        let done = match self.inner.jobs()?.get(key) {
            Some(Entry::Running(job)) => Some(job.done.clone()),
            _ => None,
        };
        if let Some(mut done) = done {
            // A closed channel means the job is gone as well.
            let _ = done.wait_for(|finished| *finished).await;
        }
        Ok(())
    }

    /// Stops every job at its next wait point and waits for them to exit.
    ///
    /// Interrupted tasks keep their non-terminal state for
    /// [`resume_incomplete`](Self::resume_incomplete).
    pub async fn shutdown(&self) -> Result<(), DoubaoError> {
        self.inner.cancel.cancel();
        let jobs: Vec<(TaskKey, Job)> = self
            .inner
            .jobs()?
            .drain()
            .filter_map(|(key, entry)| match entry {
                Entry::Running(job) => Some((key, job)),
                Entry::Reserved => None,
            })
            .collect();
        let count = jobs.len();
        for (key, job) in jobs {
            if let Err(e) = job.handle.await {
                error!(task = %key, error = %e, "video job ended abnormally");
            }
        }
        info!(jobs = count, "video scheduler stopped");
        Ok(())
    }

    /// Claims `key` unless a live job or another caller already holds it.
    ///
    /// Check and insert happen under one lock, before any store access.
    fn reserve(&self, key: &TaskKey) -> Result<Option<Reservation<'_>>, DoubaoError> {
        let mut jobs = self.inner.jobs()?;
        if jobs.get(key).is_some_and(Entry::is_live) {
            return Ok(None);
        }
        jobs.insert(key.clone(), Entry::Reserved);
        Ok(Some(Reservation {
            inner: &self.inner,
            key: key.clone(),
            armed: true,
        }))
    }

    /// Turns `reservation` into a running job for `task`.
    fn spawn(
        &self,
        mut reservation: Reservation<'_>,
        task: VideoTask,
        delay: Duration,
    ) -> Result<(), DoubaoError> {
        let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
        let key = task.key();
        let inner = Arc::clone(&self.inner);

        // Held across the spawn: a job must not remove itself before it is
        // registered.
        let mut jobs = self.inner.jobs()?;
        if self.inner.cancel.is_cancelled() {
            return Err(DoubaoError::Internal("scheduler is shut down".into()));
        }
        if !matches!(jobs.get(&reservation.key), Some(Entry::Reserved)) {
            return Err(DoubaoError::Internal(format!(
                "job registry lost the reservation for {key}"
            )));
        }

        let (done_tx, done) = watch::channel(false);
        let handle = tokio::spawn(async move {
            run_job(&inner, task, delay).await;
            if let Ok(mut jobs) = inner.jobs() {
                if matches!(jobs.get(&key), Some(Entry::Running(job)) if job.id == id) {
                    jobs.remove(&key);
                }
            }
            let _ = done_tx.send(true);
        });
        jobs.insert(
            reservation.key.clone(),
            Entry::Running(Job { id, handle, done }),
        );
        reservation.armed = false;
        Ok(())
    }
}

impl std::fmt::Debug for VideoRetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRetryScheduler")
            .field("schedule", &self.inner.schedule)
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn run_job(inner: &Inner, mut task: VideoTask, delay: Duration) {
    let key = task.key();
    if !inner.pause(delay).await {
        debug!(task = %key, "shutdown during warm-up");
        return;
    }

    while task.has_attempts_left() {
        task.begin_attempt();
        inner.save(&task).await;
        debug!(task = %key, attempt = task.retry_count, max = task.max_retries, "asking oracle");

        let attempt = tokio::time::timeout(
            inner.schedule.attempt_timeout,
            inner
                .oracle
                .fetch(&task.conversation_id, inner.schedule.oracle_timeout),
        );
        let outcome = tokio::select! {
            _ = inner.cancel.cancelled() => {
                debug!(task = %key, "shutdown during attempt");
                return;
            }
            outcome = attempt => outcome,
        };

        let failure = match outcome {
            Ok(Ok(report)) if report.is_success() => {
                let count = report.video_urls.len();
                task.complete(report.video_urls);
                inner.save(&task).await;
                info!(task = %key, attempts = task.retry_count, videos = count, "video ready");
                return;
            }
            Ok(Ok(report)) => report.error.unwrap_or_else(|| "no video found".to_string()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => DoubaoError::Timeout {
                duration: inner.schedule.attempt_timeout,
            }
            .to_string(),
        };
        warn!(
            task = %key,
            attempt = task.retry_count,
            max = task.max_retries,
            error = %failure,
            "video not ready"
        );
        task.record_failure(failure);
        inner.save(&task).await;

        if task.has_attempts_left() && !inner.pause(inner.schedule.retry_interval).await {
            debug!(task = %key, "shutdown between attempts");
            return;
        }
    }

    task.fail();
    inner.save(&task).await;
    error!(
        task = %key,
        attempts = task.retry_count,
        error = task.error.as_deref().unwrap_or(""),
        "video retrieval gave up"
    );
}
