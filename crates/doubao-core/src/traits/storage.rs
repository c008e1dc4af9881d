// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable keyed storage for video tasks.

use async_trait::async_trait;

use crate::error::DoubaoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{TaskKey, VideoTask};

/// Keyed store for [`VideoTask`] records.
///
/// `save` must be atomic per key: saving one task never overwrites a
/// concurrent save of a different key.
#[async_trait]
pub trait TaskStore: PluginAdapter {
    /// Inserts or replaces the record for `task.key()`.
    async fn save(&self, task: &VideoTask) -> Result<(), DoubaoError>;

    /// Returns the record for `key`, if any.
    async fn get(&self, key: &TaskKey) -> Result<Option<VideoTask>, DoubaoError>;

    /// All tasks belonging to one conversation, oldest first.
    async fn list_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<VideoTask>, DoubaoError>;

    /// Every stored task, oldest first.
    async fn list_all(&self) -> Result<Vec<VideoTask>, DoubaoError>;
}
