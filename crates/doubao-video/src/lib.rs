// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Video generation: the chat turn that starts it and the background
//! scheduler that retrieves the result.

pub mod schedule;
pub mod scheduler;
pub mod service;

pub use schedule::RetrySchedule;
pub use scheduler::VideoRetryScheduler;
pub use service::{VideoGenerationService, VideoImage, VideoRequest, VideoTicket};
