// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows backend: children get their own process group and are
//! terminated as a tree.

use super::ProcessError;
use std::process::ExitStatus;
use tokio::process::Command;

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

pub(super) fn configure(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

pub(super) fn shell_invocation(line: String) -> (String, Vec<String>) {
    ("cmd".to_string(), vec!["/C".to_string(), line])
}

/// Force-terminate `pid` and its descendants.
pub(super) fn terminate(pid: u32) -> Result<(), ProcessError> {
    let output = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .output()
        .map_err(|e| ProcessError::Terminate { pid, message: e.to_string() })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    // Already exited
    if stderr.contains("not found") {
        return Ok(());
    }
    Err(ProcessError::Terminate { pid, message: stderr.trim().to_string() })
}

pub(super) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
