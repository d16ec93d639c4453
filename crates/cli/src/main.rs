// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qj: run computational jobs locally, over SSH, or through a batch queue

mod color;
mod commands;
mod exit_error;
mod jobfile;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use commands::{defaults, run, show};
use exit_error::ExitError;
use std::path::PathBuf;
use std::process::ExitCode;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("QJ_BUILD_HASH"), ")");

#[derive(Parser)]
#[command(name = "qj", version = VERSION, about = "Run staged computational jobs", styles = color::styles())]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Defaults file [default: $QJ_DEFAULTS or <config dir>/qj/defaults.toml]
    #[arg(long, global = true, value_name = "PATH")]
    defaults: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a job described by a TOML file
    Run(run::RunArgs),
    /// Continue a saved job
    Resume(run::ResumeArgs),
    /// Show a saved job
    Show(show::ShowArgs),
    /// Print the effective defaults
    Defaults(defaults::DefaultsArgs),
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = || commands::load_defaults(cli.defaults.as_deref());
    match cli.command {
        Command::Run(args) => run::run(args, &config()?).await,
        Command::Resume(args) => run::resume(args, &config()?).await,
        Command::Show(args) => show::show(args),
        Command::Defaults(args) => defaults::defaults(args, &config()?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let guard = match logging::init(cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ExitError>() {
            Some(exit) => ExitCode::from(u8::try_from(exit.code).unwrap_or(1)),
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    };
    drop(guard);
    code
}
