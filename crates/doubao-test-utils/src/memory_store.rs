// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory task store for scheduler tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use doubao_core::traits::adapter::PluginAdapter;
use doubao_core::traits::storage::TaskStore;
use doubao_core::types::{AdapterType, HealthStatus, TaskKey, VideoTask, VideoTaskStatus};
use doubao_core::DoubaoError;

/// Keyed by conversation and message id. Every save is also appended to a
/// history log.
#[derive(Clone, Default)]
pub struct MemoryTaskStore {
    tasks: Arc<Mutex<BTreeMap<TaskKey, VideoTask>>>,
    history: Arc<Mutex<Vec<VideoTask>>>,
    yielding: bool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `get` and `save` give up the thread before touching
    /// state, the way a real database round trip does.
    pub fn yielding() -> Self {
        Self {
            yielding: true,
            ..Self::default()
        }
    }

    /// Seeds a task without recording it in the history.
    pub async fn insert(&self, task: VideoTask) {
        self.tasks.lock().await.insert(task.key(), task);
    }

    async fn round_trip(&self) {
        if self.yielding {
            tokio::task::yield_now().await;
        }
    }

    /// Every saved snapshot, in save order.
    pub async fn history(&self) -> Vec<VideoTask> {
        self.history.lock().await.clone()
    }

    /// Status sequence of `key` across saves, with consecutive repeats collapsed.
    pub async fn transitions(&self, key: &TaskKey) -> Vec<VideoTaskStatus> {
        let mut out: Vec<VideoTaskStatus> = Vec::new();
        for task in self.history.lock().await.iter() {
            if task.key() == *key && out.last() != Some(&task.status) {
                out.push(task.status);
            }
        }
        out
    }
}

#[async_trait]
impl PluginAdapter for MemoryTaskStore {
    fn name(&self) -> &str {
        "memory-task-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DoubaoError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoubaoError> {
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &VideoTask) -> Result<(), DoubaoError> {
        self.round_trip().await;
        self.tasks.lock().await.insert(task.key(), task.clone());
        self.history.lock().await.push(task.clone());
        Ok(())
    }

    async fn get(&self, key: &TaskKey) -> Result<Option<VideoTask>, DoubaoError> {
        self.round_trip().await;
        Ok(self.tasks.lock().await.get(key).cloned())
    }

    async fn list_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<VideoTask>, DoubaoError> {
        let mut tasks: Vec<VideoTask> = self
            .tasks
            .lock()
            .await
            .values()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn list_all(&self) -> Result<Vec<VideoTask>, DoubaoError> {
        let mut tasks: Vec<VideoTask> = self.tasks.lock().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}
