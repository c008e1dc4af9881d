// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions at the seams between the core and its
//! collaborators (durable task storage, page-scraping oracle).

pub mod adapter;
pub mod oracle;
pub mod storage;

pub use adapter::PluginAdapter;
pub use oracle::VideoOracle;
pub use storage::TaskStore;
