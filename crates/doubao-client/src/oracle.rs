// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Video oracle backed by the conversation page's markup.
//!
//! Fetches `{base_url}/chat/{conversation_id}` with the cookies of the
//! session bound to the conversation and scans the page for video links.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use doubao_config::model::PlatformConfig;
use doubao_core::{
    AdapterType, DoubaoError, HealthStatus, OracleReport, PluginAdapter, VideoOracle,
};
use doubao_pool::SessionPool;
use regex::Regex;
use tracing::{debug, warn};

use crate::params::{browser_headers, join};

static MEDIA_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://[^"'<>\s]+\.(?:mp4|webm|m3u8)"#).expect("valid media regex")
});

static VOD_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https://[^"'<>\s]*douyinvod\.com[^"'<>\s]*"#).expect("valid vod regex")
});

const MEDIA_SUFFIXES: [&str; 3] = [".mp4", ".webm", ".m3u8"];

/// Extracts video links from page markup, deduplicated in first-seen order.
///
/// JSON-escaped slashes (`\/` and `\u002F`) are unescaped before scanning.
/// Playback-info API links are never returned.
pub fn extract_video_urls(markup: &str) -> Vec<String> {
    let text = markup.replace("\\u002F", "/").replace("\\/", "/");

    let mut matches: Vec<regex::Match<'_>> = MEDIA_FILE
        .find_iter(&text)
        .chain(VOD_HOST.find_iter(&text))
        .collect();
    // Longest match first at each position; overlapping matches are dropped.
    matches.sort_by_key(|m| (m.start(), std::cmp::Reverse(m.end())));

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut covered = 0;
    for m in matches {
        if m.start() < covered {
            continue;
        }
        covered = m.end();
        let raw = m.as_str();
        let url = raw.trim_end_matches('\\').replace("&amp;", "&");
        if url.contains("get_play_info") {
            continue;
        }
        let is_video =
            url.contains("douyinvod.com") || MEDIA_SUFFIXES.iter().any(|s| url.ends_with(s));
        if is_video && seen.insert(url.clone()) {
            urls.push(url);
        }
    }
    urls
}

/// [`VideoOracle`] that scrapes the conversation page.
#[derive(Debug, Clone)]
pub struct MarkupVideoOracle {
    http: reqwest::Client,
    pool: Arc<SessionPool>,
    platform: PlatformConfig,
}

impl MarkupVideoOracle {
    pub fn new(platform: PlatformConfig, pool: Arc<SessionPool>) -> Result<Self, DoubaoError> {
        let http = reqwest::Client::builder()
            .user_agent(platform.user_agent.clone())
            .build()
            .map_err(|e| DoubaoError::Protocol {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            pool,
            platform,
        })
    }
}

#[async_trait]
impl PluginAdapter for MarkupVideoOracle {
    fn name(&self) -> &str {
        "markup-oracle"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Oracle
    }

    async fn health_check(&self) -> Result<HealthStatus, DoubaoError> {
        if self.pool.available()? == 0 {
            return Ok(HealthStatus::Unhealthy("no usable sessions".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoubaoError> {
        debug!("markup oracle shutting down");
        Ok(())
    }
}

#[async_trait]
impl VideoOracle for MarkupVideoOracle {
    async fn fetch(
        &self,
        conversation_id: &str,
        timeout: Duration,
    ) -> Result<OracleReport, DoubaoError> {
        let pooled = self.pool.acquire(Some(conversation_id), None)?;
        let path = format!("chat/{conversation_id}");
        let url = join(&self.platform.base_url, &path)?;
        let headers = browser_headers(&self.platform, &pooled.session, &path)?;

        let response = match self
            .http
            .get(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(conversation_id, error = %e, "conversation page fetch failed");
                return Ok(OracleReport::failed(format!("page fetch failed: {e}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(OracleReport::failed(format!("page returned {status}")));
        }
        let markup = match response.text().await {
            Ok(markup) => markup,
            Err(e) => return Ok(OracleReport::failed(format!("page body unreadable: {e}"))),
        };

        let urls = extract_video_urls(&markup);
        debug!(conversation_id, found = urls.len(), "scanned conversation page");
        if urls.is_empty() {
            Ok(OracleReport::failed("no video found"))
        } else {
            Ok(OracleReport::found(urls))
        }
    }
}
