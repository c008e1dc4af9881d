// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol clients for the Doubao web platform.
//!
//! - [`ChatClient`] sends one chat turn and decodes its event stream with
//!   [`StreamDecoder`], reporting the outcome back to the session pool.
//! - [`UploadClient`] runs the four-phase signed attachment upload.
//! - [`MarkupVideoOracle`] looks for generated video links on the
//!   conversation page.

pub mod chat;
pub mod oracle;
mod params;
pub mod sigv4;
pub mod stream;
mod types;
pub mod upload;

pub use chat::{CONTENT_TYPE_TEXT, CONTENT_TYPE_VIDEO, ChatAttachment, ChatClient, ChatRequest};
pub use oracle::{MarkupVideoOracle, extract_video_urls};
pub use sigv4::Signer;
pub use stream::StreamDecoder;
pub use types::UploadCredential;
pub use upload::UploadClient;
