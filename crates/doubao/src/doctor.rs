// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `doubao doctor` command implementation.
//!
//! Checks that the configuration loads, the session document is usable, the
//! task database opens, and the platform answers.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use doubao_config::model::DoubaoConfig;
use doubao_core::{DoubaoError, HealthStatus, PluginAdapter};
use doubao_pool::{SessionPool, SessionStatus};
use doubao_storage::SqliteTaskStore;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `doubao doctor` command.
///
/// `config_path` is the file given with `--config`, if any. With `plain`,
/// output carries no color.
pub async fn run_doctor(
    config: &DoubaoConfig,
    config_path: Option<&Path>,
    plain: bool,
) -> Result<(), DoubaoError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(config_path).await,
        check_sessions(Path::new(&config.sessions.path)).await,
        check_database(&config.storage.database_path, config.storage.wal_mode).await,
        check_platform(&config.platform.base_url).await,
    ];

    println!();
    println!("  doubao doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in &results {
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{}", render_line(result, use_color));
    }

    println!();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!(
            "    {symbol} {:<20} {message} ({duration_ms}ms)",
            result.name
        )
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Reloads the configuration from the same source the command used.
async fn check_config(config_path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match config_path {
        Some(path) => doubao_config::load_and_validate_path(path),
        None => doubao_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

async fn check_sessions(path: &Path) -> CheckResult {
    let start = Instant::now();
    if !path.exists() {
        return CheckResult::new(
            "Sessions",
            CheckStatus::Fail,
            format!("not found: {}", path.display()),
            start,
        );
    }

    let pool = match SessionPool::from_path(path) {
        Ok(pool) => pool,
        Err(e) => return CheckResult::new("Sessions", CheckStatus::Fail, e.to_string(), start),
    };
    let summaries = match pool.snapshot() {
        Ok(summaries) => summaries,
        Err(e) => return CheckResult::new("Sessions", CheckStatus::Fail, e.to_string(), start),
    };

    let usable = summaries
        .iter()
        .filter(|s| s.status != SessionStatus::Exhausted)
        .count();
    let guests = summaries.iter().filter(|s| s.guest).count();
    if usable == 0 {
        return CheckResult::new(
            "Sessions",
            CheckStatus::Warn,
            "document has no sessions",
            start,
        );
    }
    CheckResult::new(
        "Sessions",
        CheckStatus::Pass,
        format!("{usable} loaded ({guests} guest)"),
        start,
    )
}

async fn check_database(db_path: &str, wal_mode: bool) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let store = match SqliteTaskStore::open(&doubao_config::model::StorageConfig {
        database_path: db_path.to_string(),
        wal_mode,
    })
    .await
    {
        Ok(store) => store,
        Err(e) => {
            return CheckResult::new(
                "Database",
                CheckStatus::Fail,
                format!("open failed: {e}"),
                start,
            );
        }
    };

    match store.health_check().await {
        Ok(HealthStatus::Healthy) => {}
        Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => {
            return CheckResult::new("Database", CheckStatus::Warn, reason, start);
        }
        Err(e) => {
            return CheckResult::new(
                "Database",
                CheckStatus::Fail,
                format!("query failed: {e}"),
                start,
            );
        }
    }

    match store.status_counts().await {
        Ok(counts) => {
            let total: i64 = counts.iter().map(|(_, n)| n).sum();
            let pending: i64 = counts
                .iter()
                .filter(|(status, _)| status == "pending" || status == "processing")
                .map(|(_, n)| n)
                .sum();
            CheckResult::new(
                "Database",
                CheckStatus::Pass,
                format!("{total} video task(s), {pending} unfinished"),
                start,
            )
        }
        Err(e) => CheckResult::new(
            "Database",
            CheckStatus::Fail,
            format!("query failed: {e}"),
            start,
        ),
    }
}

/// Any HTTP answer counts as reachable; the platform rejects bare requests.
async fn check_platform(base_url: &str) -> CheckResult {
    let start = Instant::now();
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return CheckResult::new(
                "Platform",
                CheckStatus::Fail,
                format!("HTTP client error: {e}"),
                start,
            );
        }
    };

    match client.head(base_url).send().await {
        Ok(resp) if resp.status().is_server_error() => CheckResult::new(
            "Platform",
            CheckStatus::Warn,
            format!("status {}", resp.status()),
            start,
        ),
        Ok(_) => CheckResult::new("Platform", CheckStatus::Pass, "reachable", start),
        Err(e) => {
            let msg = if e.is_timeout() {
                "timeout (5s)".to_string()
            } else if e.is_connect() {
                "connection refused".to_string()
            } else {
                format!("error: {e}")
            };
            CheckResult::new("Platform", CheckStatus::Fail, msg, start)
        }
    }
}
