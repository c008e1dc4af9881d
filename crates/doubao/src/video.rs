// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `doubao video` subcommands.
//!
//! Retrieval jobs live only as long as this process. `generate` without
//! `--wait` leaves the task pending in the database; `watch` picks up every
//! unfinished task and drives it to the end.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use doubao_client::MarkupVideoOracle;
use doubao_config::model::DoubaoConfig;
use doubao_core::{DoubaoError, TaskKey, VideoTask, VideoTaskStatus};
use doubao_storage::SqliteTaskStore;
use doubao_video::{
    RetrySchedule, VideoGenerationService, VideoImage, VideoRequest, VideoRetryScheduler,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::commands::{Bridge, print_json};

/// Opens the task database (creating its directory) and builds a scheduler
/// backed by the markup oracle.
pub async fn open_scheduler(
    config: &DoubaoConfig,
    bridge: &Bridge,
) -> Result<VideoRetryScheduler, DoubaoError> {
    if let Some(parent) = Path::new(&config.storage.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DoubaoError::Storage {
                    source: Box::new(e),
                })?;
        }
    }
    let store = SqliteTaskStore::open(&config.storage).await?;
    let oracle = MarkupVideoOracle::new(config.platform.clone(), Arc::clone(&bridge.pool))?;
    Ok(VideoRetryScheduler::new(
        Arc::new(store),
        Arc::new(oracle),
        RetrySchedule::from_config(&config.video),
    ))
}

pub struct GenerateArgs {
    pub prompt: String,
    pub image_url: Option<String>,
    pub guest: bool,
    pub conversation: Option<String>,
    pub wait: bool,
    pub json: bool,
}

pub async fn run_generate(
    bridge: Bridge,
    scheduler: VideoRetryScheduler,
    args: GenerateArgs,
    cancel: CancellationToken,
) -> Result<(), DoubaoError> {
    let mut request = VideoRequest::new(args.prompt).guest(args.guest);
    if let Some(url) = args.image_url {
        request = request.with_image(VideoImage::Url(url));
    }
    if let Some(conversation_id) = args.conversation {
        request = request.in_conversation(conversation_id);
    }

    let service = VideoGenerationService::new(bridge.chat, bridge.upload, scheduler.clone());
    let ticket = match service.generate(request).await {
        Ok(ticket) => ticket,
        Err(e) => {
            scheduler.shutdown().await?;
            return Err(e);
        }
    };
    let key = TaskKey::new(&ticket.conversation_id, &ticket.message_id);

    if !args.wait {
        scheduler.shutdown().await?;
        if args.json {
            return print_json(&ticket);
        }
        println!("{}", ticket.reply);
        println!("video task {key} is pending; run `doubao video watch` to retrieve it");
        return Ok(());
    }

    eprintln!("waiting for video {key} (Ctrl+C to stop, resume later with `doubao video watch`)");
    wait_all(&scheduler, std::slice::from_ref(&key), &cancel).await?;
    scheduler.shutdown().await?;

    let task = scheduler.get(&key).await?;
    if args.json {
        return print_json(&task);
    }
    print_task(&task, use_color());
    Ok(())
}

pub async fn run_status(
    scheduler: &VideoRetryScheduler,
    key: &TaskKey,
    json: bool,
) -> Result<(), DoubaoError> {
    let task = scheduler.get(key).await?;
    if json {
        return print_json(&task);
    }
    print_task(&task, use_color());
    Ok(())
}

pub async fn run_list(
    scheduler: &VideoRetryScheduler,
    conversation_id: Option<&str>,
    json: bool,
) -> Result<(), DoubaoError> {
    let tasks = match conversation_id {
        Some(id) => scheduler.list_by_conversation(id).await?,
        None => scheduler.list_all().await?,
    };
    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("no video tasks");
        return Ok(());
    }
    let use_color = use_color();
    for task in &tasks {
        print_task(task, use_color);
    }
    Ok(())
}

/// Resumes unfinished tasks and waits for them, or for a signal.
pub async fn run_watch(
    scheduler: VideoRetryScheduler,
    cancel: CancellationToken,
) -> Result<(), DoubaoError> {
    let resumed = scheduler.resume_incomplete().await?;
    if resumed.is_empty() {
        println!("no unfinished video tasks");
        scheduler.shutdown().await?;
        return Ok(());
    }

    eprintln!("watching {} video task(s) (Ctrl+C to stop)", resumed.len());
    wait_all(&scheduler, &resumed, &cancel).await?;
    scheduler.shutdown().await?;

    let use_color = use_color();
    for key in &resumed {
        print_task(&scheduler.get(key).await?, use_color);
    }
    Ok(())
}

async fn wait_all(
    scheduler: &VideoRetryScheduler,
    keys: &[TaskKey],
    cancel: &CancellationToken,
) -> Result<(), DoubaoError> {
    for key in keys {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("stopping; unfinished tasks stay pending");
                return Ok(());
            }
            done = scheduler.wait_for(key) => done?,
        }
    }
    Ok(())
}

fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

fn print_task(task: &VideoTask, use_color: bool) {
    let status = task.status.to_string();
    let status = if use_color {
        use colored::Colorize;
        match task.status {
            VideoTaskStatus::Completed => status.green().to_string(),
            VideoTaskStatus::Failed => status.red().to_string(),
            VideoTaskStatus::Pending | VideoTaskStatus::Processing => {
                status.yellow().to_string()
            }
        }
    } else {
        status
    };
    println!(
        "{}  {status}  attempts {}/{}  updated {}",
        task.key(),
        task.retry_count,
        task.max_retries,
        task.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    for url in &task.video_urls {
        println!("    {url}");
    }
    if let Some(error) = &task.error {
        println!("    last error: {error}");
    }
}
