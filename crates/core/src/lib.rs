// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qj-core: Core types for the qj job execution engine

pub mod macros;

pub mod config;
pub mod id;
pub mod job;
pub mod step;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{BatchDefaults, ConfigError, Defaults, GridDefaults, SshDefaults};
pub use id::{short, JobId};
pub use job::{
    epoch_ms, params, JobKind, JobProgress, JobStatus, Parameters, StepRecord, StepRecordOutcome,
};
pub use step::{
    resolve_path, ActionSpec, AppSpec, JobStep, NotPersistable, StepAction, StepCallback,
    StepKind, StepOutcome, StepOutput, StepSpec,
};
