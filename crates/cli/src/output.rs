// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::ValueEnum;
use qj_core::{StepRecord, StepRecordOutcome};
use serde::Serialize;
use std::time::Duration;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Compact duration: "850ms", "12s", "3m05s", "2h10m".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        return format!("{}ms", d.as_millis());
    }
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m{:02}s", s / 60, s % 60),
        s => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
    }
}

/// One history line: outcome, name and how long the step took.
pub fn format_record(record: &StepRecord) -> String {
    let took = record
        .finished_at_ms
        .map(|end| format_duration(Duration::from_millis(end.saturating_sub(record.started_at_ms))))
        .unwrap_or_else(|| "-".to_string());
    let outcome = match &record.outcome {
        StepRecordOutcome::Failed(reason) => format!("failed: {reason}"),
        other => other.to_string(),
    };
    format!("{:<24} {:>8}  {}", record.name, took, outcome)
}
