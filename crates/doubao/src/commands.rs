// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chat`, `upload`, `delete`, and `sessions` commands.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use doubao_client::{ChatClient, ChatRequest, UploadClient};
use doubao_config::model::DoubaoConfig;
use doubao_core::{AttachmentKind, DoubaoError};
use doubao_pool::{SessionPool, SessionStatus};
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "heic"];

/// Session pool plus the clients that draw from it.
pub struct Bridge {
    pub pool: Arc<SessionPool>,
    pub chat: ChatClient,
    pub upload: UploadClient,
}

impl Bridge {
    pub fn connect(config: &DoubaoConfig) -> Result<Self, DoubaoError> {
        let pool = Arc::new(SessionPool::from_path(Path::new(&config.sessions.path))?);
        let chat = ChatClient::new(config.platform.clone(), Arc::clone(&pool))?;
        let upload = UploadClient::new(
            config.platform.clone(),
            config.upload.clone(),
            Arc::clone(&pool),
        )?;
        Ok(Self { pool, chat, upload })
    }
}

/// Image for common picture extensions, document otherwise.
pub fn attachment_kind(path: &Path) -> AttachmentKind {
    let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if is_image {
        AttachmentKind::Image
    } else {
        AttachmentKind::Document
    }
}

pub struct ChatArgs {
    pub prompt: String,
    pub conversation: Option<String>,
    pub section: Option<String>,
    pub guest: bool,
    pub deep_think: bool,
    pub attach: Vec<PathBuf>,
    pub json: bool,
}

pub async fn run_chat(bridge: &Bridge, args: ChatArgs) -> Result<(), DoubaoError> {
    let mut request = ChatRequest::new(args.prompt)
        .guest(args.guest)
        .deep_think(args.deep_think);
    if let Some(conversation_id) = args.conversation {
        request = request.in_conversation(conversation_id);
    }
    if let Some(section_id) = args.section {
        request = request.in_section(section_id);
    }
    for path in &args.attach {
        let descriptor = bridge.upload.upload_path(attachment_kind(path), path).await?;
        debug!(key = %descriptor.key, "attachment ready");
        request = request.with_attachment(descriptor);
    }

    let result = bridge.chat.complete(request).await?;
    if args.json {
        print_json(&result)?;
        return Ok(());
    }

    println!("{}", result.text);
    for url in &result.image_urls {
        println!("{url}");
    }
    eprintln!(
        "conversation {} message {} section {}",
        result.conversation_id, result.message_id, result.section_id
    );
    Ok(())
}

pub async fn run_upload(
    bridge: &Bridge,
    path: &Path,
    kind: Option<AttachmentKind>,
) -> Result<(), DoubaoError> {
    let kind = kind.unwrap_or_else(|| attachment_kind(path));
    let descriptor = bridge.upload.upload_path(kind, path).await?;
    print_json(&descriptor)
}

pub async fn run_delete(bridge: &Bridge, conversation_id: &str) -> Result<(), DoubaoError> {
    bridge.chat.delete_conversation(conversation_id).await?;
    println!("deleted conversation {conversation_id}");
    Ok(())
}

pub fn run_sessions(pool: &SessionPool, plain: bool) -> Result<(), DoubaoError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let summaries = pool.snapshot()?;
    if summaries.is_empty() {
        println!("no sessions loaded");
        return Ok(());
    }

    for summary in summaries {
        let account = if summary.guest { "guest" } else { "account" };
        let status = status_label(&summary.status);
        let status = if use_color {
            use colored::Colorize;
            match summary.status {
                SessionStatus::Free | SessionStatus::Bound { .. } => status.green().to_string(),
                SessionStatus::RateLimited { .. } => status.yellow().to_string(),
                SessionStatus::Exhausted => status.red().to_string(),
            }
        } else {
            status
        };
        println!(
            "  {:<12} {:<24} {:<8} {status}",
            summary.id.to_string(),
            summary.device_id,
            account
        );
    }
    Ok(())
}

fn status_label(status: &SessionStatus) -> String {
    match status {
        SessionStatus::Free => "free".to_string(),
        SessionStatus::Bound { conversation_ids } => {
            format!("bound ({})", conversation_ids.join(", "))
        }
        SessionStatus::RateLimited { conversation_ids } => {
            format!("rate-limited ({})", conversation_ids.join(", "))
        }
        SessionStatus::Exhausted => "exhausted".to_string(),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), DoubaoError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| DoubaoError::Internal(format!("failed to render JSON: {e}")))?;
    println!("{rendered}");
    Ok(())
}
