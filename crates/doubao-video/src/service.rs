// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text-to-video and image-to-video requests.

use doubao_client::{CONTENT_TYPE_VIDEO, ChatAttachment, ChatClient, ChatRequest, UploadClient};
use doubao_core::{CompletionResult, DoubaoError, TaskKey, VideoTask};
use serde::Serialize;
use tracing::info;

use crate::scheduler::VideoRetryScheduler;

/// Source image for image-to-video generation.
#[derive(Debug, Clone)]
pub enum VideoImage {
    /// Downloaded and uploaded before the chat turn.
    Url(String),
    /// An attachment uploaded earlier.
    Attachment(ChatAttachment),
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub image: Option<VideoImage>,
    pub guest: bool,
    pub conversation_id: Option<String>,
    pub section_id: Option<String>,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            guest: false,
            conversation_id: None,
            section_id: None,
        }
    }

    pub fn with_image(mut self, image: VideoImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn guest(mut self, guest: bool) -> Self {
        self.guest = guest;
        self
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Returned as soon as the generation turn is accepted. The video itself is
/// retrieved in the background.
#[derive(Debug, Clone, Serialize)]
pub struct VideoTicket {
    pub conversation_id: String,
    pub message_id: String,
    pub section_id: String,
    /// Text the platform streamed back for the turn.
    pub reply: String,
    pub task: VideoTask,
}

/// Chat turn plus background retrieval for one video.
#[derive(Debug, Clone)]
pub struct VideoGenerationService {
    chat: ChatClient,
    upload: UploadClient,
    scheduler: VideoRetryScheduler,
}

impl VideoGenerationService {
    pub fn new(chat: ChatClient, upload: UploadClient, scheduler: VideoRetryScheduler) -> Self {
        Self {
            chat,
            upload,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &VideoRetryScheduler {
        &self.scheduler
    }

    pub async fn generate(&self, request: VideoRequest) -> Result<VideoTicket, DoubaoError> {
        let mut turn = ChatRequest::new(request.prompt)
            .guest(request.guest)
            .content_type(CONTENT_TYPE_VIDEO)
            .auto_cot(false)
            .deep_think(false);
        if let Some(conversation_id) = request.conversation_id {
            turn = turn.in_conversation(conversation_id);
        }
        if let Some(section_id) = request.section_id {
            turn = turn.in_section(section_id);
        }
        match request.image {
            Some(VideoImage::Url(url)) => {
                let descriptor = self.upload.upload_from_url(&url).await?;
                turn = turn.with_attachment(descriptor);
            }
            Some(VideoImage::Attachment(attachment)) => {
                turn = turn.with_attachment(attachment);
            }
            None => {}
        }

        let CompletionResult {
            text,
            conversation_id,
            message_id,
            section_id,
            ..
        } = self.chat.complete(turn).await?;
        if conversation_id.is_empty() || message_id.is_empty() {
            return Err(DoubaoError::protocol(
                "video turn completed without conversation or message id",
            ));
        }

        let task = self
            .scheduler
            .submit(TaskKey::new(&conversation_id, &message_id))
            .await?;
        info!(%conversation_id, %message_id, "video generation accepted");

        Ok(VideoTicket {
            conversation_id,
            message_id,
            section_id,
            reply: text,
            task,
        })
    }
}
