// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Video task CRUD operations.

use chrono::{DateTime, SecondsFormat, Utc};
use doubao_core::{DoubaoError, TaskKey, VideoTask, VideoTaskStatus};
use rusqlite::types::Type;
use rusqlite::{Row, params};

use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "conversation_id, message_id, status, video_urls, retry_count, \
                       max_retries, error, created_at, updated_at";

/// Fixed-width RFC 3339 so that text order equals time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_error(
    index: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
}

fn task_from_row(row: &Row<'_>) -> Result<VideoTask, rusqlite::Error> {
    let status: String = row.get(2)?;
    let video_urls: String = row.get(3)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let parse_time = |index: usize, raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(index, e))
    };

    Ok(VideoTask {
        conversation_id: row.get(0)?,
        message_id: row.get(1)?,
        status: status
            .parse::<VideoTaskStatus>()
            .map_err(|e| conversion_error(2, e))?,
        video_urls: serde_json::from_str(&video_urls).map_err(|e| conversion_error(3, e))?,
        retry_count: row.get(4)?,
        max_retries: row.get(5)?,
        error: row.get(6)?,
        created_at: parse_time(7, &created_at)?,
        updated_at: parse_time(8, &updated_at)?,
    })
}

/// Inserts the task or replaces every mutable column of the existing row.
///
/// `created_at` keeps its first written value.
pub async fn upsert_task(db: &Database, task: &VideoTask) -> Result<(), DoubaoError> {
    let key = task.key().to_string();
    let task = task.clone();
    let video_urls = serde_json::to_string(&task.video_urls).map_err(|e| DoubaoError::Storage {
        source: Box::new(e),
    })?;

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO video_tasks (task_key, conversation_id, message_id, status, \
                 video_urls, retry_count, max_retries, error, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT (conversation_id, message_id) DO UPDATE SET \
                 status = excluded.status, \
                 video_urls = excluded.video_urls, \
                 retry_count = excluded.retry_count, \
                 max_retries = excluded.max_retries, \
                 error = excluded.error, \
                 updated_at = excluded.updated_at",
                params![
                    key,
                    task.conversation_id,
                    task.message_id,
                    task.status.to_string(),
                    video_urls,
                    task.retry_count,
                    task.max_retries,
                    task.error,
                    timestamp(&task.created_at),
                    timestamp(&task.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a task by key.
pub async fn get_task(db: &Database, key: &TaskKey) -> Result<Option<VideoTask>, DoubaoError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| -> Result<Option<VideoTask>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM video_tasks \
                 WHERE conversation_id = ?1 AND message_id = ?2"
            ))?;
            match stmt.query_row(
                params![key.conversation_id, key.message_id],
                task_from_row,
            ) {
                Ok(task) => Ok(Some(task)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Tasks of one conversation, oldest first.
pub async fn list_by_conversation(
    db: &Database,
    conversation_id: &str,
) -> Result<Vec<VideoTask>, DoubaoError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<VideoTask>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM video_tasks WHERE conversation_id = ?1 \
                 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(params![conversation_id], task_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Every task, oldest first.
pub async fn list_all(db: &Database) -> Result<Vec<VideoTask>, DoubaoError> {
    db.connection()
        .call(|conn| -> Result<Vec<VideoTask>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM video_tasks ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map([], task_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Number of stored tasks per status, for health reporting.
pub async fn count_by_status(db: &Database) -> Result<Vec<(String, i64)>, DoubaoError> {
    db.connection()
        .call(|conn| -> Result<Vec<(String, i64)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM video_tasks GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
