// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive intervals, backoff ordering and sink prerequisites.

use crate::diagnostic::ConfigError;
use crate::model::{CourierConfig, SinkKind};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.log.level.as_str()) {
        errors.push(invalid(format!(
            "log.level `{}` must be one of {}",
            config.log.level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path must not be empty".to_string()));
    }

    let outbox = &config.outbox;
    check_worker(
        "outbox",
        WorkerLimits {
            poll_interval_ms: outbox.poll_interval_ms,
            batch_size: outbox.batch_size,
            max_retries: outbox.max_retries,
            timeout_ms: outbox.dispatch_timeout_ms,
            timeout_key: "dispatch_timeout_ms",
            stale_after_secs: outbox.stale_after_secs,
            initial_backoff_ms: outbox.initial_backoff_ms,
            max_backoff_ms: outbox.max_backoff_ms,
        },
        &mut errors,
    );

    let inbox = &config.inbox;
    check_worker(
        "inbox",
        WorkerLimits {
            poll_interval_ms: inbox.poll_interval_ms,
            batch_size: inbox.batch_size,
            max_retries: inbox.max_retries,
            timeout_ms: inbox.handler_timeout_ms,
            timeout_key: "handler_timeout_ms",
            stale_after_secs: inbox.stale_after_secs,
            initial_backoff_ms: inbox.initial_backoff_ms,
            max_backoff_ms: inbox.max_backoff_ms,
        },
        &mut errors,
    );

    if let Some(url) = &inbox.forward_url {
        if !is_http_url(url) {
            errors.push(invalid(format!(
                "inbox.forward_url `{url}` must be an http(s) URL"
            )));
        }
    }

    if config.retention.sweep_interval_secs == 0 {
        errors.push(invalid("retention.sweep_interval_secs must be positive".to_string()));
    }

    match (&config.sink.kind, &config.sink.webhook_url) {
        (SinkKind::Webhook, None) => {
            errors.push(invalid(
                "sink.webhook_url is required when sink.kind = \"webhook\"".to_string(),
            ));
        }
        (_, Some(url)) if !is_http_url(url) => {
            errors.push(invalid(format!(
                "sink.webhook_url `{url}` must be an http(s) URL"
            )));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

struct WorkerLimits {
    poll_interval_ms: u64,
    batch_size: usize,
    max_retries: u32,
    timeout_ms: u64,
    timeout_key: &'static str,
    stale_after_secs: u64,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

fn check_worker(section: &str, limits: WorkerLimits, errors: &mut Vec<ConfigError>) {
    if limits.poll_interval_ms == 0 {
        errors.push(invalid(format!("{section}.poll_interval_ms must be positive")));
    }
    if limits.batch_size == 0 {
        errors.push(invalid(format!("{section}.batch_size must be positive")));
    }
    if limits.max_retries == 0 {
        errors.push(invalid(format!("{section}.max_retries must be at least 1")));
    }
    if limits.timeout_ms == 0 {
        errors.push(invalid(format!(
            "{section}.{} must be positive",
            limits.timeout_key
        )));
    }
    // An attempt still running when it turns stale would be dispatched twice.
    if limits.stale_after_secs.saturating_mul(1000) <= limits.timeout_ms {
        errors.push(invalid(format!(
            "{section}.stale_after_secs ({}s) must exceed {section}.{} ({}ms)",
            limits.stale_after_secs, limits.timeout_key, limits.timeout_ms
        )));
    }
    if limits.max_backoff_ms < limits.initial_backoff_ms {
        errors.push(invalid(format!(
            "{section}.max_backoff_ms ({}) must be >= {section}.initial_backoff_ms ({})",
            limits.max_backoff_ms, limits.initial_backoff_ms
        )));
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}
