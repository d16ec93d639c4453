// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix backend: each child leads its own process group so a kill reaches
//! everything it started.

use super::ProcessError;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use tokio::process::Command;

pub(super) fn configure(cmd: &mut Command) {
    cmd.process_group(0);
}

pub(super) fn shell_invocation(line: String) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), line])
}

/// SIGKILL the process group led by `pid`.
pub(super) fn terminate(pid: u32) -> Result<(), ProcessError> {
    let raw = i32::try_from(pid)
        .map_err(|_| ProcessError::Terminate { pid, message: "pid out of range".to_string() })?;
    if raw <= 0 {
        return Err(ProcessError::Terminate { pid, message: "no such process".to_string() });
    }
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ProcessError::Terminate { pid, message: e.to_string() }),
    }
}

/// Exit code, or `128 + signal` for signal deaths (shell convention).
pub(super) fn exit_code(status: ExitStatus) -> i32 {
    status.code().or_else(|| status.signal().map(|sig| 128 + sig)).unwrap_or(-1)
}
