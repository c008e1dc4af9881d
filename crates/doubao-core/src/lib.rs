// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Doubao bridge.
//!
//! Holds the closed error taxonomy, the domain types passed between the
//! session pool, the protocol clients, task storage, and the retry
//! scheduler, and the adapter traits those collaborators implement.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{DoubaoError, UploadPhase};
pub use traits::{PluginAdapter, TaskStore, VideoOracle};
pub use types::{
    AdapterType, AttachmentDescriptor, AttachmentKind, CompletionResult, HealthStatus,
    ImageDimensions, OracleReport, Session, TaskKey, VideoTask, VideoTaskStatus,
};
