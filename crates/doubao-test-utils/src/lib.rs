// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles and fixtures shared by the workspace's test suites.
//!
//! - [`MemoryTaskStore`]: in-memory `TaskStore` that also keeps every saved
//!   snapshot, so tests can assert on state-transition sequences.
//! - [`MockOracle`]: scripted `VideoOracle`.
//! - [`fixtures`]: session records and event-stream record builders.

pub mod fixtures;
pub mod memory_store;
pub mod mock_oracle;

pub use fixtures::{guest_session, test_session};
pub use memory_store::MemoryTaskStore;
pub use mock_oracle::{MockOracle, OracleCall};
