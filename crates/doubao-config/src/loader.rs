// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based layered loading.
//!
//! Merge order, later wins: compiled defaults, `/etc/doubao/doubao.toml`,
//! `~/.config/doubao/doubao.toml`, `./doubao.toml`, `DOUBAO_*` variables.

#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::DoubaoConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/doubao/doubao.toml";
pub(crate) const LOCAL_CONFIG: &str = "doubao.toml";

/// Sections that may be addressed from the environment.
const ENV_SECTIONS: &[&str] = &[
    "general", "platform", "sessions", "upload", "storage", "video",
];

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("doubao/doubao.toml"))
}

/// Load configuration from the full hierarchy.
pub fn load_config() -> Result<DoubaoConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<DoubaoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DoubaoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DoubaoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DoubaoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The un-extracted figment for the full hierarchy.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DoubaoConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `DOUBAO_VIDEO_MAX_RETRIES` maps to `video.max_retries`.
///
/// Only the first underscore after a known section name becomes a dot;
/// `split("_")` would break keys such as `retry_interval_secs`.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("DOUBAO_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("video_max_retries"), "video.max_retries");
        assert_eq!(
            map_env_key("video_retry_interval_secs"),
            "video.retry_interval_secs"
        );
        assert_eq!(map_env_key("platform_base_url"), "platform.base_url");
        assert_eq!(map_env_key("general_log_level"), "general.log_level");
    }

    #[test]
    fn env_keys_are_matched_case_insensitively() {
        assert_eq!(map_env_key("VIDEO_MAX_RETRIES"), "video.max_retries");
        assert_eq!(map_env_key("Storage_Wal_Mode"), "storage.wal_mode");
    }

    #[test]
    fn unknown_prefix_is_left_alone() {
        assert_eq!(map_env_key("frobnicate"), "frobnicate");
    }
}
