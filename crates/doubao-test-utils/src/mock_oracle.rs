// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted video oracle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use doubao_core::traits::adapter::PluginAdapter;
use doubao_core::traits::oracle::VideoOracle;
use doubao_core::types::{AdapterType, HealthStatus, OracleReport};
use doubao_core::DoubaoError;

/// One recorded `fetch` invocation.
#[derive(Debug, Clone)]
pub struct OracleCall {
    pub conversation_id: String,
    pub timeout: Duration,
    /// Tokio clock at the time of the call, so paused-time tests can check
    /// the spacing between attempts.
    pub at: Instant,
}

enum Scripted {
    Report(OracleReport),
    Error(String),
    Hang,
}

/// Pops one scripted outcome per call. An exhausted script answers with a
/// failed report.
#[derive(Clone, Default)]
pub struct MockOracle {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<OracleCall>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle that never finds a video.
    pub fn always_failing() -> Self {
        Self::new()
    }

    pub async fn push_report(&self, report: OracleReport) {
        self.script.lock().await.push_back(Scripted::Report(report));
    }

    pub async fn push_failure(&self, error: &str) {
        self.push_report(OracleReport::failed(error)).await;
    }

    pub async fn push_found(&self, urls: &[&str]) {
        self.push_report(OracleReport::found(
            urls.iter().map(|u| u.to_string()).collect(),
        ))
        .await;
    }

    /// The next call returns `Err`.
    pub async fn push_error(&self, message: &str) {
        self.script
            .lock()
            .await
            .push_back(Scripted::Error(message.to_string()));
    }

    /// The next call never completes.
    pub async fn push_hang(&self) {
        self.script.lock().await.push_back(Scripted::Hang);
    }

    pub async fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for MockOracle {
    fn name(&self) -> &str {
        "mock-oracle"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Oracle
    }

    async fn health_check(&self) -> Result<HealthStatus, DoubaoError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoubaoError> {
        Ok(())
    }
}

#[async_trait]
impl VideoOracle for MockOracle {
    async fn fetch(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Result<OracleReport, DoubaoError> {
        self.calls.lock().await.push(OracleCall {
            conversation_id: conversation_id.to_string(),
            timeout,
            at: Instant::now(),
        });

        let next = self.script.lock().await.pop_front();
        match next {
            Some(Scripted::Report(report)) => Ok(report),
            Some(Scripted::Error(message)) => Err(DoubaoError::Internal(message)),
            Some(Scripted::Hang) => {
                std::future::pending::<()>().await;
                Ok(OracleReport::failed("unreachable"))
            }
            None => Ok(OracleReport::failed("no video found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_script_then_fails() {
        let oracle = MockOracle::new();
        oracle.push_found(&["https://v/1.mp4"]).await;

        let first = oracle.fetch("c1", Duration::from_secs(1)).await.unwrap();
        assert!(first.is_success());

        let second = oracle.fetch("c1", Duration::from_secs(1)).await.unwrap();
        assert!(!second.is_success());
        assert_eq!(oracle.call_count().await, 2);
    }

    #[tokio::test]
    async fn scripted_error_is_returned() {
        let oracle = MockOracle::new();
        oracle.push_error("browser crashed").await;
        let err = oracle.fetch("c1", Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("browser crashed"));
    }
}
