// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming chat completion client.
//!
//! [`ChatClient::complete`] takes a session from the pool, posts the turn,
//! runs the response body through [`StreamDecoder`], and reports the outcome
//! back to the pool: success rebinds the conversation, a rate limit flags
//! the session but keeps the binding, and quota exhaustion evicts it.

use std::sync::Arc;

use doubao_config::model::PlatformConfig;
use doubao_core::{AttachmentDescriptor, AttachmentKind, CompletionResult, DoubaoError};
use doubao_pool::{PooledSession, SessionPool};
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::params::{browser_headers, insert, platform_url};
use crate::stream::StreamDecoder;
use crate::types::{
    CompletionOption, CompletionRequest, DeleteThreadRequest, RequestMessage,
};

/// Plain chat turn.
pub const CONTENT_TYPE_TEXT: u32 = 2001;
/// Turn that asks the platform to generate a video.
pub const CONTENT_TYPE_VIDEO: u32 = 2020;

/// Conversation id that asks the platform to open a new conversation.
const NEW_CONVERSATION: &str = "0";

/// The platform marks attachments it has already reviewed and parsed with 3.
const ATTACHMENT_READY_STATE: u8 = 3;

/// An attachment in a chat request.
#[derive(Debug, Clone)]
pub enum ChatAttachment {
    /// Result of a completed upload.
    Uploaded(AttachmentDescriptor),
    /// A pre-built attachment object, sent verbatim.
    Raw(Value),
}

impl ChatAttachment {
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Raw(value) => value.clone(),
            Self::Uploaded(descriptor) => match descriptor.kind {
                AttachmentKind::Image => {
                    let mut value = json!({
                        "type": "vlm_image",
                        "key": descriptor.key,
                        "name": descriptor.name,
                        "identifier": uuid::Uuid::new_v4().to_string(),
                        "file_review_state": ATTACHMENT_READY_STATE,
                        "file_parse_state": ATTACHMENT_READY_STATE,
                    });
                    if let Some(dims) = descriptor.dimensions {
                        value["option"] = json!({ "width": dims.width, "height": dims.height });
                    }
                    value
                }
                AttachmentKind::Document => json!({
                    "type": "file",
                    "key": descriptor.key,
                    "name": descriptor.name,
                    "md5": descriptor.checksum,
                    "size": descriptor.size,
                    "file_review_state": ATTACHMENT_READY_STATE,
                    "file_parse_state": ATTACHMENT_READY_STATE,
                }),
            },
        }
    }
}

impl From<AttachmentDescriptor> for ChatAttachment {
    fn from(descriptor: AttachmentDescriptor) -> Self {
        Self::Uploaded(descriptor)
    }
}

/// One chat turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    /// Use a guest account for a new conversation. Guest turns also omit the
    /// local conversation/message ids that logged-in web clients send.
    pub guest: bool,
    pub conversation_id: Option<String>,
    pub section_id: Option<String>,
    pub attachments: Vec<ChatAttachment>,
    pub use_auto_cot: bool,
    pub use_deep_think: bool,
    pub content_type: u32,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            guest: false,
            conversation_id: None,
            section_id: None,
            attachments: Vec::new(),
            use_auto_cot: false,
            use_deep_think: false,
            content_type: CONTENT_TYPE_TEXT,
        }
    }

    pub fn guest(mut self, guest: bool) -> Self {
        self.guest = guest;
        self
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn in_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: impl Into<ChatAttachment>) -> Self {
        self.attachments.push(attachment.into());
        self
    }

    pub fn auto_cot(mut self, enabled: bool) -> Self {
        self.use_auto_cot = enabled;
        self
    }

    pub fn deep_think(mut self, enabled: bool) -> Self {
        self.use_deep_think = enabled;
        self
    }

    pub fn content_type(mut self, content_type: u32) -> Self {
        self.content_type = content_type;
        self
    }

    fn to_wire(&self) -> CompletionRequest {
        let (local_conversation_id, local_message_id) = if self.guest {
            (None, None)
        } else {
            let local = uuid::Uuid::new_v4().as_u128() % 10_000_000_000_000_000;
            (
                Some(format!("local_{local}")),
                Some(uuid::Uuid::new_v4().to_string()),
            )
        };

        CompletionRequest {
            completion_option: CompletionOption {
                is_regen: false,
                with_suggest: false,
                need_create_conversation: self.conversation_id.is_none(),
                launch_stage: 1,
                use_auto_cot: self.use_auto_cot,
                use_deep_think: self.use_deep_think,
            },
            conversation_id: self
                .conversation_id
                .clone()
                .unwrap_or_else(|| NEW_CONVERSATION.to_string()),
            messages: vec![RequestMessage {
                content: json!({ "text": self.prompt }).to_string(),
                content_type: self.content_type,
                attachments: self.attachments.iter().map(ChatAttachment::to_wire).collect(),
                references: Vec::new(),
            }],
            section_id: self.section_id.clone(),
            local_conversation_id,
            local_message_id,
        }
    }
}

/// Client for the streaming chat and thread endpoints.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    pool: Arc<SessionPool>,
    platform: PlatformConfig,
}

impl ChatClient {
    pub fn new(platform: PlatformConfig, pool: Arc<SessionPool>) -> Result<Self, DoubaoError> {
        let http = reqwest::Client::builder()
            .user_agent(platform.user_agent.clone())
            .timeout(platform.request_timeout())
            .build()
            .map_err(|e| DoubaoError::Protocol {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            pool,
            platform,
        })
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Sends one turn and waits for the end of its event stream.
    pub async fn complete(&self, request: ChatRequest) -> Result<CompletionResult, DoubaoError> {
        let pooled = self
            .pool
            .acquire(request.conversation_id.as_deref(), Some(request.guest))?;
        debug!(
            session = %pooled.id,
            conversation_id = request.conversation_id.as_deref().unwrap_or("<new>"),
            content_type = request.content_type,
            "sending chat turn"
        );

        let outcome = self.send_turn(&pooled, &request).await;
        self.apply_outcome(&pooled, &request, outcome)
    }

    async fn send_turn(
        &self,
        pooled: &PooledSession,
        request: &ChatRequest,
    ) -> Result<CompletionResult, DoubaoError> {
        let session = &pooled.session;
        let url = platform_url(&self.platform, "/samantha/chat/completion", session)?;

        let mut headers =
            browser_headers(&self.platform, session, &format!("chat/{}", session.room_id))?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        insert(&mut headers, "agw-js-conv", "str")?;
        insert(&mut headers, "x-flow-trace", &session.flow_trace)?;

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(&request.to_wire())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DoubaoError::protocol(format!(
                "chat endpoint returned {status}: {body}"
            )));
        }

        let mut decoder = StreamDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(transport_error)?;
            if let Some(result) = decoder.feed(&chunk)? {
                return Ok(result);
            }
        }
        decoder.finish()
    }

    fn apply_outcome(
        &self,
        pooled: &PooledSession,
        request: &ChatRequest,
        outcome: Result<CompletionResult, DoubaoError>,
    ) -> Result<CompletionResult, DoubaoError> {
        match outcome {
            Ok(result) => {
                if result.conversation_id.is_empty() {
                    warn!(session = %pooled.id, "completed turn carried no conversation id");
                } else {
                    self.pool.bind(&result.conversation_id, pooled.id, false)?;
                }
                info!(
                    conversation_id = %result.conversation_id,
                    message_id = %result.message_id,
                    images = result.image_urls.len(),
                    "chat turn completed"
                );
                Ok(result)
            }
            Err(DoubaoError::RateLimited {
                conversation_id: seen,
            }) => {
                let conversation_id = request.conversation_id.clone().or(seen);
                match &conversation_id {
                    Some(conversation_id) => self.pool.bind(conversation_id, pooled.id, true)?,
                    None => {
                        self.pool.mark_rate_limited(pooled.id)?;
                    }
                }
                Err(DoubaoError::RateLimited { conversation_id })
            }
            Err(DoubaoError::QuotaExhausted) => {
                self.pool.evict(pooled.id)?;
                Err(DoubaoError::QuotaExhausted)
            }
            Err(other) => Err(other),
        }
    }

    /// Deletes a conversation on the platform using its bound session.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), DoubaoError> {
        let pooled = self.pool.acquire(Some(conversation_id), None)?;
        let session = &pooled.session;
        let url = platform_url(&self.platform, "/samantha/thread/delete", session)?;
        let headers =
            browser_headers(&self.platform, session, &format!("chat/{conversation_id}"))?;

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(&DeleteThreadRequest { conversation_id })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DoubaoError::protocol(format!(
                "thread delete returned {status}"
            )));
        }
        info!(conversation_id, "conversation deleted");
        Ok(())
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> DoubaoError {
    DoubaoError::Protocol {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}
