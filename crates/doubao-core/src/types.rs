// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the pool, protocol clients, storage, and scheduler.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Oracle,
}

// --- Sessions ---

/// A bundle of scraped identifiers and cookies authenticating as one
/// remote account/device.
///
/// Field names on the wire match the document written by the credential
/// capture tool (`cookie`, `x_flow_trace`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub device_id: String,
    pub tea_uuid: String,
    pub web_id: String,
    pub room_id: String,
    #[serde(rename = "x_flow_trace")]
    pub flow_trace: String,
    #[serde(rename = "cookie")]
    pub cookie_jar: String,
    /// Whether the account is a not-logged-in guest.
    #[serde(default)]
    pub guest: bool,
}

impl Session {
    /// Iterates the `name=value` pairs of the cookie header string.
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookie_jar
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| !name.is_empty())
    }
}

// Cookies and the flow trace token are credentials.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.device_id)
            .field("web_id", &self.web_id)
            .field("room_id", &self.room_id)
            .field("guest", &self.guest)
            .finish_non_exhaustive()
    }
}

// --- Attachments ---

/// Kind of resource accepted by the upload handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttachmentKind {
    Document,
    Image,
}

impl AttachmentKind {
    /// The platform's numeric `resource_type` discriminator.
    pub fn resource_type(self) -> u8 {
        match self {
            Self::Document => 1,
            Self::Image => 2,
        }
    }

    /// Inverse of [`resource_type`](Self::resource_type).
    pub fn from_resource_type(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Document),
            2 => Some(Self::Image),
            _ => None,
        }
    }
}

/// Pixel dimensions reported for an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// The durable result of a completed upload, later embedded in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    /// Remote object identifier (`ImageUri`).
    pub key: String,
    /// Display name, the original file name.
    pub name: String,
    pub kind: AttachmentKind,
    /// Byte size, reported for documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Reported for images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<ImageDimensions>,
    /// Hex MD5, reported (or locally computed) for documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

// --- Chat ---

/// The terminal result of one successful chat turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Concatenated message text with surrounding newlines stripped.
    pub text: String,
    /// Ready image URLs, deduplicated, in first-seen order.
    pub image_urls: Vec<String>,
    pub conversation_id: String,
    pub message_id: String,
    pub section_id: String,
}

// --- Video tasks ---

/// Composite key of a video job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub conversation_id: String,
    pub message_id: String,
}

impl TaskKey {
    pub fn new(conversation_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// Renders the persisted document key, `"{conversation_id}_{message_id}"`.
impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.conversation_id, self.message_id)
    }
}

/// Lifecycle state of a [`VideoTask`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VideoTaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VideoTaskStatus {
    /// `completed` and `failed` are final; no further attempt may run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A long-running "fetch the generated video" job.
///
/// Transitions are expressed as methods so the scheduler cannot skip the
/// bookkeeping (`retry_count`, `updated_at`) that goes with each state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTask {
    pub conversation_id: String,
    pub message_id: String,
    pub status: VideoTaskStatus,
    pub video_urls: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl VideoTask {
    /// Creates a fresh task in `pending`.
    pub fn new(key: TaskKey, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: key.conversation_id,
            message_id: key.message_id,
            status: VideoTaskStatus::Pending,
            video_urls: Vec::new(),
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.conversation_id, &self.message_id)
    }

    pub fn has_attempts_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// `pending|processing -> processing`, consuming one attempt.
    pub fn begin_attempt(&mut self) {
        self.status = VideoTaskStatus::Processing;
        self.retry_count += 1;
        self.touch();
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, video_urls: Vec<String>) {
        self.status = VideoTaskStatus::Completed;
        self.video_urls = video_urls;
        self.error = None;
        self.touch();
    }

    /// Records an unsuccessful attempt without leaving `processing`.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.touch();
    }

    /// `processing -> failed` once the attempt budget is spent.
    pub fn fail(&mut self) {
        self.status = VideoTaskStatus::Failed;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// What the page-scraping oracle reported for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReport {
    pub success: bool,
    #[serde(default)]
    pub video_urls: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OracleReport {
    pub fn found(video_urls: Vec<String>) -> Self {
        Self {
            success: true,
            video_urls,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            video_urls: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// An attempt only counts when the oracle succeeded and produced a URL.
    pub fn is_success(&self) -> bool {
        self.success && !self.video_urls.is_empty()
    }
}
