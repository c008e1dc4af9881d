// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pool of captured platform sessions.
//!
//! The pool hands out credentials for chat and upload calls, keeps the
//! sticky conversation -> session binding, flags rate-limited credentials,
//! and permanently removes credentials whose quota is exhausted.

pub mod loader;
pub mod pool;

pub use loader::{load_sessions, parse_sessions};
pub use pool::{PooledSession, SessionId, SessionPool, SessionStatus, SessionSummary};
