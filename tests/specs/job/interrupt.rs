// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ctrl-C handling: stop, save and resume

#![cfg(unix)]

use crate::prelude::*;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

fn interrupt(child: &Child) {
    let status = Command::new("kill").args(["-INT", &child.id().to_string()]).status().unwrap();
    assert!(status.success());
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> i32 {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status.code().unwrap_or(-1);
        }
        if start.elapsed() > deadline {
            let _ = child.kill();
            panic!("qj did not exit within {deadline:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn spawn_qj(args: &[&str]) -> Child {
    Command::new(assert_cmd::cargo::cargo_bin("qj"))
        .args(args)
        .env("QJ_DEFAULTS", "/nonexistent/qj-defaults.toml")
        .env("QJ_LOG", "warn")
        .env("NO_COLOR", "1")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

const SLOW_JOB: &str = r#"
name = "slow"

[[steps]]
kind = "run_app_via_shell"
command = "echo first > first.txt"

[[steps]]
kind = "run_app"
command = "sleep"
args = ["30"]

[[steps]]
kind = "run_app_via_shell"
command = "echo last > last.txt"
"#;

#[test]
fn ctrl_c_stops_and_saves_the_job() {
    let project = Project::empty();
    let job = project.file("slow.toml", SLOW_JOB);
    let saved = project.path().join("slow.json");

    let mut child = spawn_qj(&["run", job.to_str().unwrap(), "--save", saved.to_str().unwrap(), "--poll-ms", "100"]);
    std::thread::sleep(Duration::from_millis(700));
    interrupt(&child);

    assert_eq!(wait_with_deadline(&mut child, Duration::from_secs(10)), 0);
    assert!(project.exists("first.txt"));
    assert!(!project.exists("last.txt"));

    // The interrupted step is still ahead of the job
    cli()
        .args(&["show", saved.to_str().unwrap()])
        .passes()
        .stdout_has("1. run sleep")
        .stdout_has("2. run echo last > last.txt");
}

#[test]
fn ctrl_c_without_save_exits_stopped() {
    let project = Project::empty();
    let job = project.file("slow.toml", SLOW_JOB);

    let mut child = spawn_qj(&["run", job.to_str().unwrap(), "--poll-ms", "100"]);
    std::thread::sleep(Duration::from_millis(700));
    interrupt(&child);

    assert_eq!(wait_with_deadline(&mut child, Duration::from_secs(10)), 3);
    assert!(!project.exists("last.txt"));
}
