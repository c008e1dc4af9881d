// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for video generation tasks.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer model via
//! `tokio-rusqlite`. Tasks are stored one row per
//! `"{conversation_id}_{message_id}"` key.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod tasks;

pub use adapter::SqliteTaskStore;
pub use database::Database;
