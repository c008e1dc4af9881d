// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port for the external collaborator that discovers generated video links.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DoubaoError;
use crate::traits::adapter::PluginAdapter;
use crate::types::OracleReport;

/// Answers "are the videos for this conversation ready yet?".
///
/// The method behind the answer (page markup, browser automation, ...) is
/// opaque to the scheduler. An `Err` is treated like a failed report: it is
/// recorded on the task and the next attempt still runs.
#[async_trait]
pub trait VideoOracle: PluginAdapter {
    async fn fetch(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Result<OracleReport, DoubaoError>;
}
