// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber setup for the `qj` binary.
//!
//! The filter comes from `QJ_LOG`, then `RUST_LOG`, then [`DEFAULT_FILTER`].
//! Output goes to stderr unless `--log-file` names a file.

use anyhow::Context;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "QJ_LOG";
pub const DEFAULT_FILTER: &str = "info";

/// Directives for the subscriber, in precedence order.
pub fn filter_directives(qj_log: Option<String>, rust_log: Option<String>) -> String {
    qj_log
        .filter(|s| !s.trim().is_empty())
        .or(rust_log.filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn env_filter() -> EnvFilter {
    let directives =
        filter_directives(std::env::var(LOG_ENV).ok(), std::env::var("RUST_LOG").ok());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live until
/// the process exits.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(env_filter());

    let Some(path) = log_file else {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(false).compact();
        registry.with(layer).try_init().context("logging already initialized")?;
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
    registry.with(layer).try_init().context("logging already initialized")?;
    Ok(Some(guard))
}
