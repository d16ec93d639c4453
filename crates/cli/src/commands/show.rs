// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::color;
use crate::output::{format_record, print_json, OutputFormat};
use clap::Args;
use qj_core::JobStep;
use qj_engine::JobSnapshot;
use std::path::PathBuf;

#[derive(Args)]
pub struct ShowArgs {
    /// Snapshot file
    pub snapshot: PathBuf,

    #[arg(long = "output", short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub fn show(args: ShowArgs) -> anyhow::Result<()> {
    let snapshot = JobSnapshot::read(&args.snapshot)?;
    match args.output {
        OutputFormat::Json => print_json(&snapshot),
        OutputFormat::Text => {
            print!("{}", render(&snapshot));
            Ok(())
        }
    }
}

pub fn render(snapshot: &JobSnapshot) -> String {
    let mut out = format!("{} ({})  {}\n", snapshot.name, snapshot.id, snapshot.kind);
    out.push_str(&format!("saved      {}\n", snapshot.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
    if let Some(remote_id) = &snapshot.remote_id {
        out.push_str(&format!("remote id  {remote_id}\n"));
    }
    if let Some(scratch) = &snapshot.scratch {
        out.push_str(&format!("scratch    {scratch}\n"));
    }
    if let Some(message) = &snapshot.message {
        out.push_str(&format!("message    {message}\n"));
    }

    if !snapshot.parameters.is_empty() {
        out.push_str(&format!("{}\n", color::header("parameters")));
        for (key, value) in snapshot.parameters.iter() {
            out.push_str(&format!("  {key} = {value}\n"));
        }
    }
    out.push_str(&format!("{}\n", color::header("steps")));
    let mut names: Vec<String> =
        snapshot.steps.iter().map(|spec| JobStep::from(spec.clone()).name().to_string()).collect();
    for callback in &snapshot.callbacks {
        let index = callback.index.min(names.len());
        names.insert(index, format!("{} {}", callback.name, color::muted("(callback)")));
    }
    if names.is_empty() {
        out.push_str(&format!("  {}\n", color::muted("(none)")));
    }
    for (i, name) in names.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, name));
    }
    if !snapshot.warnings.is_empty() {
        out.push_str(&format!("{}\n", color::header("warnings")));
        for warning in &snapshot.warnings {
            out.push_str(&format!("  {warning}\n"));
        }
    }
    if !snapshot.step_history.is_empty() {
        out.push_str(&format!("{}\n", color::header("history")));
        for record in &snapshot.step_history {
            out.push_str(&format!("  {}\n", format_record(record)));
        }
    }
    out
}

#[cfg(test)]
#[path = "show_tests.rs"]
mod tests;
