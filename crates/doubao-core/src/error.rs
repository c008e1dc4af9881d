// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Doubao bridge.

use strum::{Display, EnumString};
use thiserror::Error;

/// The four sequential phases of the signed upload handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum UploadPhase {
    /// Upload authorization and ephemeral credential issuance.
    Prepare,
    /// Signed storage-broker request that allocates a store target.
    Apply,
    /// Raw, checksum-verified byte transfer.
    Upload,
    /// Signed confirmation that turns the stored object into an attachment.
    Commit,
}

/// The primary error type used across every Doubao bridge crate.
///
/// The protocol-facing variants form a closed taxonomy so callers can branch
/// on the failure kind instead of matching on message strings.
#[derive(Debug, Error)]
pub enum DoubaoError {
    /// Configuration errors (invalid TOML, bad session document, bad header values).
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable session for the request: the pool is empty, nothing matches
    /// the requested account kind, or the conversation's session was evicted.
    #[error("no session available{}", conversation_suffix(.conversation_id))]
    SessionNotFound { conversation_id: Option<String> },

    /// The platform throttled the credential. The conversation binding is kept.
    #[error("rate limited by platform{}", conversation_suffix(.conversation_id))]
    RateLimited { conversation_id: Option<String> },

    /// The credential's free usage allotment is spent; the session was evicted
    /// and must be replaced with a freshly captured one.
    #[error("session quota exhausted, capture a new session")]
    QuotaExhausted,

    /// The platform gateway reported an error inside the event stream.
    #[error("gateway error {code}: {message}")]
    Gateway { code: String, message: String },

    /// Malformed or truncated event stream, transport failure, or an
    /// unexpected response from the chat endpoint.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// One of the four upload phases failed, including precondition checks.
    #[error("upload failed in {phase} phase: {message}")]
    UploadPhase { phase: UploadPhase, message: String },

    /// Query for a video task key that was never submitted.
    #[error("video task not found: {conversation_id}_{message_id}")]
    TaskNotFound {
        conversation_id: String,
        message_id: String,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DoubaoError {
    /// Shorthand for a [`DoubaoError::Protocol`] without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`DoubaoError::UploadPhase`].
    pub fn upload(phase: UploadPhase, message: impl Into<String>) -> Self {
        Self::UploadPhase {
            phase,
            message: message.into(),
        }
    }

    /// Returns the failed phase when this is an upload error.
    pub fn upload_phase(&self) -> Option<UploadPhase> {
        match self {
            Self::UploadPhase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

fn conversation_suffix(conversation_id: &Option<String>) -> String {
    match conversation_id {
        Some(id) => format!(" for conversation {id}"),
        None => String::new(),
    }
}
