// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tracing subscriber setup: stdout, or a non-blocking file writer when a log
//! location is configured.

use crate::error::{Result, SyncerError};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to the configured log mode
fn env_filter(log_mode: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(log_mode),
    }
}

fn parse_filter(log_mode: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(log_mode)
        .map_err(|e| SyncerError::ConfigError(format!("invalid log-mode {}: {}", log_mode, e)))
}

/// Install the global subscriber. The returned guard must live as long as the
/// process when logging to a file, otherwise buffered lines are lost.
pub fn init_logging(log_mode: &str, log_location: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(log_mode)?;

    let Some(location) = log_location else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| SyncerError::ConfigError(format!("failed to init logging: {}", e)))?;
        return Ok(None);
    };

    let file_name = location
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            SyncerError::ConfigError(format!("invalid log-location {}", location.display()))
        })?;
    let directory = location
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|e| {
            SyncerError::ConfigError(format!(
                "failed to open log file {}: {}",
                location.display(),
                e
            ))
        })?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| SyncerError::ConfigError(format!("failed to init logging: {}", e)))?;

    Ok(Some(guard))
}
