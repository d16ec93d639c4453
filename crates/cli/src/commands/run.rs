// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `qj run` and `qj resume`: drive a job in the foreground.
//!
//! The first Ctrl-C asks the job to stop at a resumable point. A stopped
//! job is written to `--save` when one is given. A second Ctrl-C kills.

use crate::color;
use crate::exit_error::ExitError;
use crate::jobfile::JobFile;
use anyhow::Context;
use clap::Args;
use parking_lot::Mutex;
use qj_core::{params, Defaults, JobProgress, JobStatus};
use qj_engine::{Job, JobRegistry, JobRunner, Monitor};
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct RunArgs {
    /// Job description (TOML)
    pub job_file: PathBuf,

    /// Save the job here if it is stopped
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,

    /// Override the poll interval (milliseconds)
    #[arg(long, value_name = "MS")]
    pub poll_ms: Option<u64>,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Snapshot written by `qj run --save`
    pub snapshot: PathBuf,

    /// Where to save the job if it is stopped again [default: the snapshot]
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,
}

pub async fn run(args: RunArgs, defaults: &Defaults) -> anyhow::Result<()> {
    let base_dir = match args.job_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let base_dir = std::fs::canonicalize(base_dir)
        .with_context(|| format!("cannot resolve {}", base_dir.display()))?;
    let job = JobFile::load(&args.job_file)?.into_job(defaults, &base_dir)?;
    if let Some(ms) = args.poll_ms {
        job.set_parameter(params::POLL_INTERVAL_MS, ms.to_string())?;
    }
    drive(job, args.save.as_deref()).await
}

pub async fn resume(args: ResumeArgs, defaults: &Defaults) -> anyhow::Result<()> {
    let job = Job::load(&args.snapshot, defaults)
        .with_context(|| format!("cannot resume {}", args.snapshot.display()))?;
    let save = args.save.unwrap_or_else(|| args.snapshot.clone());
    drive(job, Some(&save)).await
}

/// Print the step name each time a new step starts.
fn report_steps(job: &Job) {
    let last = Mutex::new(None::<(usize, String)>);
    job.set_on_progress(move |progress: &JobProgress| {
        let Some(name) = progress.active_step_name.clone() else {
            return;
        };
        let current = (progress.step_count, name);
        let mut last = last.lock();
        if last.as_ref() != Some(&current) {
            eprintln!("{} {}", color::muted("step"), current.1);
            *last = Some(current);
        }
    });
    let id = job.id().clone();
    job.set_on_complete(move |failed| tracing::debug!(job_id = %id, failed, "job complete"));
}

async fn drive(job: Job, save: Option<&Path>) -> anyhow::Result<()> {
    let registry = JobRegistry::new();
    registry.register(job.clone());
    report_steps(&job);
    eprintln!("{} {} [{}]", color::muted("job"), job.name(), job.id().short(8));
    let monitor = Monitor::new(registry).spawn();

    let finished = JobRunner::start(job.clone()).join();
    tokio::pin!(finished);
    let mut interrupts = 0u32;
    let result = loop {
        tokio::select! {
            result = &mut finished => break result,
            signal = tokio::signal::ctrl_c() => {
                signal.context("cannot listen for Ctrl-C")?;
                interrupts += 1;
                if interrupts == 1 {
                    eprintln!("stopping {} (Ctrl-C again to kill)", job.name());
                    let stopping = job.clone();
                    tokio::spawn(async move {
                        if let Err(e) = stopping.stop().await {
                            tracing::warn!(job_id = %stopping.id(), error = %e, "stop failed");
                        }
                    });
                } else {
                    eprintln!("killing {}", job.name());
                    job.kill().await;
                }
            }
        }
    };
    monitor.shutdown().await;
    let status = result?;
    print_outcome(&job, status);

    if status == JobStatus::Stopped {
        if let Some(path) = save {
            job.save(path)?;
            println!("saved to {}", path.display());
            return Ok(());
        }
    }
    match ExitError::for_status(status, &job.name()) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_outcome(job: &Job, status: JobStatus) {
    for record in job.step_history() {
        if let Some(out) = &record.stdout {
            print!("{out}");
            if !out.ends_with('\n') {
                println!();
            }
        }
    }
    for warning in job.warnings() {
        eprintln!("warning: {warning}");
    }
    if status.is_failure() {
        if let Some(message) = job.message() {
            eprintln!("error: {message}");
        }
    }
    println!("{} {}", job.name(), color::status(status));
}
