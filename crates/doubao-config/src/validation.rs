// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation.
//!
//! Collects every violation instead of stopping at the first one.

use crate::diagnostic::ConfigError;
use crate::model::DoubaoConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &DoubaoConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.general.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "general.log_level `{}` must be one of {}",
                config.general.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    check_url(&mut errors, "platform.base_url", &config.platform.base_url);
    check_url(&mut errors, "upload.imagex_url", &config.upload.imagex_url);
    check_url(&mut errors, "upload.upload_url", &config.upload.upload_url);

    for (key, value) in [
        ("platform.aid", &config.platform.aid),
        ("upload.region", &config.upload.region),
        ("upload.service", &config.upload.service),
        ("sessions.path", &config.sessions.path),
        ("storage.database_path", &config.storage.database_path),
    ] {
        if value.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{key} must not be empty"),
            });
        }
    }

    if config.platform.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "platform.request_timeout_secs must be greater than zero".to_string(),
        });
    }

    if config.video.max_retries < 1 {
        errors.push(ConfigError::Validation {
            message: "video.max_retries must be at least 1".to_string(),
        });
    }

    if config.video.oracle_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "video.oracle_timeout_ms must be greater than zero".to_string(),
        });
    }

    if config.video.attempt_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "video.attempt_timeout_secs must be greater than zero".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ConfigError>, key: &str, value: &str) {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => errors.push(ConfigError::Validation {
            message: format!("{key} must use http or https, got `{}`", parsed.scheme()),
        }),
        Err(e) => errors.push(ConfigError::Validation {
            message: format!("{key} `{value}` is not a valid URL: {e}"),
        }),
    }
}
