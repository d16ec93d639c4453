// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to flush logs before the process ends.

use qj_core::JobStatus;
use std::fmt;

/// Exit code of a job that ran to `Failed`.
pub const FAILED: i32 = 1;
/// Exit code of a job that was killed.
pub const KILLED: i32 = 2;
/// Exit code of a job left `Stopped` without a snapshot.
pub const STOPPED: i32 = 3;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Error for a job that ended in `status`, or `None` when it succeeded.
    pub fn for_status(status: JobStatus, name: &str) -> Option<Self> {
        let code = match status {
            JobStatus::Failed => FAILED,
            JobStatus::Killed => KILLED,
            JobStatus::Stopped => STOPPED,
            _ => return None,
        };
        Some(Self::new(code, format!("job {name} {status}")))
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
