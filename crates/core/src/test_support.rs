// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::step::{JobStep, StepAction};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::job::JobStatus;
    use crate::step::{AppSpec, JobStep};
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Idle),
            Just(JobStatus::Running),
            Just(JobStatus::KillPending),
            Just(JobStatus::Killed),
            Just(JobStatus::Failed),
            Just(JobStatus::Warning),
            Just(JobStatus::Stopped),
            Just(JobStatus::Done),
            Just(JobStatus::Saved),
        ]
    }

    fn arb_file_name() -> impl Strategy<Value = String> {
        "[a-z]{1,8}\\.(dat|log|out)"
    }

    /// Any persistable step (no callbacks), with random error flags.
    pub fn arb_step() -> impl Strategy<Value = JobStep> {
        let action = prop_oneof![
            Just(JobStep::allocate_scratch()),
            arb_file_name().prop_map(|f| JobStep::delete_file(f)),
            arb_file_name().prop_map(|f| JobStep::copy_out(f.clone(), f)),
            "[a-z]{1,6}".prop_map(|c| JobStep::run_app(AppSpec::new(c))),
            "[a-z]{1,6}".prop_map(|c| JobStep::run_app_via_shell(AppSpec::new(c))),
            arb_file_name().prop_map(|f| JobStep::copy_back(f.clone(), f)),
            Just(JobStep::clean_scratch()),
        ];
        (action, any::<bool>(), any::<bool>())
            .prop_map(|(step, kill, warn)| step.kill_on_error(kill).warn_on_error(warn))
    }

    pub fn arb_steps(max: usize) -> impl Strategy<Value = Vec<JobStep>> {
        prop::collection::vec(arb_step(), 0..=max)
    }
}

// ── Step factory functions ──────────────────────────────────────────────

/// The canonical local staging sequence: delete, stage in, run, retrieve.
pub fn staging_steps(command: &str, args: &[&str]) -> Vec<JobStep> {
    use crate::step::AppSpec;
    vec![
        JobStep::delete_file("out.log").kill_on_error(false),
        JobStep::copy_out("in.dat", "in.dat"),
        JobStep::run_app(AppSpec::new(command).args(args.iter().copied())),
        JobStep::copy_back("in.dat", "in.dat"),
    ]
}

/// Index of the first run-app step, if any.
pub fn run_step_index(steps: &[JobStep]) -> Option<usize> {
    steps
        .iter()
        .position(|s| matches!(s.action(), StepAction::RunApp(_) | StepAction::RunAppViaShell(_)))
}
