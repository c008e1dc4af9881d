// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler timing and state transitions on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use doubao_core::{DoubaoError, TaskKey, VideoTask, VideoTaskStatus};
use doubao_test_utils::{MemoryTaskStore, MockOracle};
use doubao_video::{RetrySchedule, VideoRetryScheduler};
use tokio::time::Instant;

const WARMUP: Duration = Duration::from_secs(180);
const INTERVAL: Duration = Duration::from_secs(180);

fn schedule(max_retries: u32) -> RetrySchedule {
    RetrySchedule {
        warmup: WARMUP,
        retry_interval: INTERVAL,
        max_retries,
        oracle_timeout: Duration::from_millis(25_000),
        attempt_timeout: Duration::from_secs(120),
    }
}

fn scheduler(
    store: &MemoryTaskStore,
    oracle: &MockOracle,
    max_retries: u32,
) -> VideoRetryScheduler {
    VideoRetryScheduler::new(
        Arc::new(store.clone()),
        Arc::new(oracle.clone()),
        schedule(max_retries),
    )
}

#[tokio::test(start_paused = true)]
async fn exhausts_budget_with_fixed_spacing() {
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::always_failing();
    let scheduler = scheduler(&store, &oracle, 3);
    let key = TaskKey::new("conv-1", "msg-1");
    let start = Instant::now();

    let submitted = scheduler.submit(key.clone()).await.unwrap();
    assert_eq!(submitted.status, VideoTaskStatus::Pending);
    assert_eq!(submitted.retry_count, 0);
    scheduler.wait_for(&key).await.unwrap();

    let task = scheduler.get(&key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Failed);
    assert_eq!(task.retry_count, 3);
    assert_eq!(task.error.as_deref(), Some("no video found"));
    assert!(task.video_urls.is_empty());

    let calls = oracle.calls().await;
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].at - start, WARMUP);
    assert_eq!(calls[1].at - calls[0].at, INTERVAL);
    assert_eq!(calls[2].at - calls[1].at, INTERVAL);
    assert!(calls.iter().all(|c| c.conversation_id == "conv-1"));
    assert!(calls.iter().all(|c| c.timeout == Duration::from_millis(25_000)));

    assert_eq!(
        store.transitions(&key).await,
        vec![
            VideoTaskStatus::Pending,
            VideoTaskStatus::Processing,
            VideoTaskStatus::Failed
        ]
    );
    assert!(scheduler.active_jobs().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stops_at_first_success() {
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::new();
    oracle.push_failure("still rendering").await;
    oracle
        .push_found(&["https://v.example.com/out.mp4", "https://v.example.com/out.m3u8"])
        .await;
    let scheduler = scheduler(&store, &oracle, 10);
    let key = TaskKey::new("conv-2", "msg-1");

    scheduler.submit(key.clone()).await.unwrap();
    scheduler.wait_for(&key).await.unwrap();

    let task = scheduler.get(&key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Completed);
    assert_eq!(task.retry_count, 2);
    assert_eq!(
        task.video_urls,
        vec!["https://v.example.com/out.mp4", "https://v.example.com/out.m3u8"]
    );
    assert_eq!(task.error, None);
    assert_eq!(oracle.call_count().await, 2);
    assert_eq!(
        store.transitions(&key).await,
        vec![
            VideoTaskStatus::Pending,
            VideoTaskStatus::Processing,
            VideoTaskStatus::Completed
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn oracle_errors_are_recorded_and_retried() {
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::new();
    oracle.push_error("browser crashed").await;
    oracle.push_found(&["https://v.example.com/a.mp4"]).await;
    let scheduler = scheduler(&store, &oracle, 5);
    let key = TaskKey::new("conv-3", "msg-1");

    scheduler.submit(key.clone()).await.unwrap();
    scheduler.wait_for(&key).await.unwrap();

    let history = store.history().await;
    assert!(
        history
            .iter()
            .any(|t| t.error.as_deref().is_some_and(|e| e.contains("browser crashed")))
    );
    let task = scheduler.get(&key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Completed);
    assert_eq!(task.retry_count, 2);
}

#[tokio::test(start_paused = true)]
async fn hung_attempt_is_cut_off_by_attempt_timeout() {
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::new();
    oracle.push_hang().await;
    oracle.push_found(&["https://v.example.com/a.mp4"]).await;
    let scheduler = scheduler(&store, &oracle, 5);
    let key = TaskKey::new("conv-4", "msg-1");
    let start = Instant::now();

    scheduler.submit(key.clone()).await.unwrap();
    scheduler.wait_for(&key).await.unwrap();

    let task = scheduler.get(&key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Completed);
    assert_eq!(task.retry_count, 2);

    let calls = oracle.calls().await;
    assert_eq!(
        calls[1].at - start,
        WARMUP + Duration::from_secs(120) + INTERVAL
    );
    let history = store.history().await;
    assert!(
        history
            .iter()
            .any(|t| t.error.as_deref().is_some_and(|e| e.contains("timed out")))
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_task_is_not_found() {
    let scheduler = scheduler(&MemoryTaskStore::new(), &MockOracle::new(), 3);
    let err = scheduler
        .get(&TaskKey::new("nope", "nothing"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DoubaoError::TaskNotFound { ref conversation_id, ref message_id }
            if conversation_id == "nope" && message_id == "nothing"
    ));
}

#[tokio::test(start_paused = true)]
async fn running_key_is_not_started_twice() {
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::always_failing();
    let scheduler = scheduler(&store, &oracle, 2);
    let key = TaskKey::new("conv-5", "msg-1");

    scheduler.submit(key.clone()).await.unwrap();
    scheduler.submit(key.clone()).await.unwrap();
    assert_eq!(scheduler.active_jobs().unwrap(), vec![key.clone()]);

    scheduler.wait_for(&key).await.unwrap();
    assert_eq!(oracle.call_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_of_one_key_start_one_job() {
    let store = MemoryTaskStore::yielding();
    let oracle = MockOracle::always_failing();
    let scheduler = scheduler(&store, &oracle, 2);
    let key = TaskKey::new("conv-5", "msg-2");

    let (first, second) = tokio::join!(
        scheduler.submit(key.clone()),
        scheduler.submit(key.clone())
    );
    assert_eq!(first.unwrap().key(), key);
    assert_eq!(second.unwrap().key(), key);
    assert_eq!(scheduler.active_jobs().unwrap(), vec![key.clone()]);

    scheduler.wait_for(&key).await.unwrap();
    assert_eq!(oracle.call_count().await, 2);
    let task = scheduler.get(&key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Failed);
    assert_eq!(task.retry_count, 2);
}

#[tokio::test(start_paused = true)]
async fn abandoned_submit_releases_its_key() {
    let store = MemoryTaskStore::yielding();
    let oracle = MockOracle::always_failing();
    let scheduler = scheduler(&store, &oracle, 1);
    let key = TaskKey::new("conv-5", "msg-3");

    // The submit is dropped while it waits on the store.
    tokio::select! {
        biased;
        _ = scheduler.submit(key.clone()) => panic!("submit finished before being dropped"),
        _ = tokio::task::yield_now() => {}
    }
    assert!(scheduler.active_jobs().unwrap().is_empty());

    scheduler.submit(key.clone()).await.unwrap();
    assert_eq!(scheduler.active_jobs().unwrap(), vec![key.clone()]);
    scheduler.wait_for(&key).await.unwrap();
    assert_eq!(oracle.call_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn finished_task_is_returned_without_new_job() {
    let store = MemoryTaskStore::new();
    let key = TaskKey::new("conv-6", "msg-1");
    let mut done = VideoTask::new(key.clone(), 3);
    done.begin_attempt();
    done.complete(vec!["https://v.example.com/a.mp4".into()]);
    store.insert(done.clone()).await;

    let oracle = MockOracle::new();
    let scheduler = scheduler(&store, &oracle, 3);
    let returned = scheduler.submit(key.clone()).await.unwrap();

    assert_eq!(returned, done);
    assert!(scheduler.active_jobs().unwrap().is_empty());
    tokio::time::sleep(WARMUP * 2).await;
    assert_eq!(oracle.call_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn resume_continues_from_persisted_count() {
    let store = MemoryTaskStore::new();
    let live_key = TaskKey::new("conv-7", "msg-1");
    let mut live = VideoTask::new(live_key.clone(), 3);
    live.begin_attempt();
    live.begin_attempt();
    store.insert(live).await;

    let spent_key = TaskKey::new("conv-7", "msg-2");
    let mut spent = VideoTask::new(spent_key.clone(), 2);
    spent.begin_attempt();
    spent.begin_attempt();
    store.insert(spent).await;

    let oracle = MockOracle::always_failing();
    let scheduler = scheduler(&store, &oracle, 3);
    let start = Instant::now();

    let resumed = scheduler.resume_incomplete().await.unwrap();
    assert_eq!(resumed, vec![live_key.clone()]);
    assert_eq!(
        scheduler.get(&spent_key).await.unwrap().status,
        VideoTaskStatus::Failed
    );

    scheduler.wait_for(&live_key).await.unwrap();
    let task = scheduler.get(&live_key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Failed);
    assert_eq!(task.retry_count, 3);

    let calls = oracle.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].at - start, INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn shutdown_leaves_task_resumable() {
    let store = MemoryTaskStore::new();
    let oracle = MockOracle::always_failing();
    let scheduler = scheduler(&store, &oracle, 3);
    let key = TaskKey::new("conv-8", "msg-1");

    scheduler.submit(key.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    scheduler.shutdown().await.unwrap();

    let task = scheduler.get(&key).await.unwrap();
    assert_eq!(task.status, VideoTaskStatus::Pending);
    assert!(scheduler.active_jobs().unwrap().is_empty());
    assert_eq!(oracle.call_count().await, 0);
    assert!(scheduler.submit(TaskKey::new("conv-8", "msg-2")).await.is_err());
}
