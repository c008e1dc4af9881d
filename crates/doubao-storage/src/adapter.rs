// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`TaskStore`] trait.

use async_trait::async_trait;
use doubao_config::model::StorageConfig;
use doubao_core::{
    AdapterType, DoubaoError, HealthStatus, PluginAdapter, TaskKey, TaskStore, VideoTask,
};
use tracing::{debug, info};

use crate::database::{Database, map_tr_err};
use crate::tasks;

/// SQLite-backed video task store.
///
/// Each save is one upsert of one row, so concurrent saves of different keys
/// never overwrite each other.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    db: Database,
    wal_mode: bool,
}

impl SqliteTaskStore {
    /// Opens the database named by `config` and applies migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, DoubaoError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        info!(path = %config.database_path, "video task store opened");
        Ok(Self {
            db,
            wal_mode: config.wal_mode,
        })
    }

    pub async fn open_in_memory() -> Result<Self, DoubaoError> {
        Ok(Self {
            db: Database::open_in_memory().await?,
            wal_mode: false,
        })
    }

    /// Task counts grouped by status name.
    pub async fn status_counts(&self) -> Result<Vec<(String, i64)>, DoubaoError> {
        tasks::count_by_status(&self.db).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteTaskStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DoubaoError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoubaoError> {
        if self.wal_mode {
            self.db.checkpoint().await?;
        }
        debug!("video task store shut down");
        Ok(())
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn save(&self, task: &VideoTask) -> Result<(), DoubaoError> {
        tasks::upsert_task(&self.db, task).await?;
        debug!(
            task = %task.key(),
            status = %task.status,
            retry_count = task.retry_count,
            "video task saved"
        );
        Ok(())
    }

    async fn get(&self, key: &TaskKey) -> Result<Option<VideoTask>, DoubaoError> {
        tasks::get_task(&self.db, key).await
    }

    async fn list_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<VideoTask>, DoubaoError> {
        tasks::list_by_conversation(&self.db, conversation_id).await
    }

    async fn list_all(&self) -> Result<Vec<VideoTask>, DoubaoError> {
        tasks::list_all(&self.db).await
    }
}
