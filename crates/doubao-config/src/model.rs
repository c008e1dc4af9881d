// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a mistyped key fails at
//! startup instead of silently falling back to a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DoubaoConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    /// Remote platform endpoint and the fixed identifiers sent on every call.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Session document location.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Upload handshake endpoints and signing scope.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Video task database.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Video retry scheduling.
    #[serde(default)]
    pub video: VideoConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Chat platform configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Origin of the web application, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Application id sent as both `aid` and `real_aid`.
    #[serde(default = "default_aid")]
    pub aid: String,

    #[serde(default = "default_pc_version")]
    pub pc_version: String,

    #[serde(default = "default_version_code")]
    pub version_code: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Sent as both `region` and `sys_region`.
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout. Applies to the whole chat stream.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl PlatformConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            aid: default_aid(),
            pc_version: default_pc_version(),
            version_code: default_version_code(),
            language: default_language(),
            region: default_region(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.doubao.com".to_string()
}

fn default_aid() -> String {
    "497858".to_string()
}

fn default_pc_version() -> String {
    "2.23.2".to_string()
}

fn default_version_code() -> String {
    "20800".to_string()
}

fn default_language() -> String {
    "zh".to_string()
}

fn default_region() -> String {
    "CN".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/132.0.0.0 Safari/537.36"
        .to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    /// JSON array of captured sessions.
    #[serde(default = "default_sessions_path")]
    pub path: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            path: default_sessions_path(),
        }
    }
}

fn default_sessions_path() -> String {
    "session.json".to_string()
}

/// Upload handshake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    /// Storage broker serving the signed apply and commit actions.
    #[serde(default = "default_imagex_url")]
    pub imagex_url: String,

    /// Base of the raw byte transfer target; the store URI is appended.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Signing region.
    #[serde(default = "default_signing_region")]
    pub region: String,

    /// Signing service name.
    #[serde(default = "default_signing_service")]
    pub service: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_scene_id")]
    pub scene_id: String,

    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            imagex_url: default_imagex_url(),
            upload_url: default_upload_url(),
            region: default_signing_region(),
            service: default_signing_service(),
            api_version: default_api_version(),
            scene_id: default_scene_id(),
            tenant_id: default_tenant_id(),
        }
    }
}

fn default_imagex_url() -> String {
    "https://imagex.bytedanceapi.com/".to_string()
}

fn default_upload_url() -> String {
    "https://tos-d-x-hl.snssdk.com/upload/v1".to_string()
}

fn default_signing_region() -> String {
    "cn-north-1".to_string()
}

fn default_signing_service() -> String {
    "imagex".to_string()
}

fn default_api_version() -> String {
    "2018-08-01".to_string()
}

fn default_scene_id() -> String {
    "5".to_string()
}

fn default_tenant_id() -> String {
    "5".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Write-ahead logging.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    "doubao.db".to_string()
}

fn default_true() -> bool {
    true
}

/// Video retry scheduling.
///
/// Generation on the platform takes minutes, so the first oracle attempt is
/// delayed by `warmup_secs` and later attempts are spaced by
/// `retry_interval_secs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VideoConfig {
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,

    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// Attempt budget per task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Passed to the oracle as its own page-load budget.
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    /// Hard ceiling on one oracle attempt, enforced by the scheduler.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

impl VideoConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            max_retries: default_max_retries(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

fn default_warmup_secs() -> u64 {
    180
}

fn default_retry_interval_secs() -> u64 {
    180
}

fn default_max_retries() -> u32 {
    10
}

fn default_oracle_timeout_ms() -> u64 {
    25_000
}

fn default_attempt_timeout_secs() -> u64 {
    120
}
