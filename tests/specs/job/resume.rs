// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `qj show` and `qj resume` specs

use crate::prelude::*;

fn snapshot(project: &Project, version: u32) -> String {
    let json = serde_json::json!({
        "v": version,
        "id": "job-spec01",
        "name": "resumed",
        "kind": "local",
        "parameters": { "local_dir": project.path().display().to_string() },
        "steps": [
            { "kind": "run_app_via_shell", "command": "echo again > again.txt" },
            { "kind": "run_app", "command": "echo", "args": ["finished"], "name": "report" }
        ],
        "warnings": ["earlier warning"],
        "created_at": "2026-01-01T00:00:00Z"
    });
    project.file("job.json", &json.to_string()).display().to_string()
}

#[test]
fn show_lists_remaining_steps() {
    let project = Project::empty();
    let path = snapshot(&project, 1);
    cli()
        .args(&["show", &path])
        .passes()
        .stdout_has("resumed (job-spec01)  local")
        .stdout_has("1. run echo again > again.txt")
        .stdout_has("2. report")
        .stdout_has("earlier warning");
}

#[test]
fn show_json_round_trips_the_snapshot() {
    let project = Project::empty();
    let path = snapshot(&project, 1);
    let result = cli().args(&["show", &path, "-o", "json"]).passes();
    let json: serde_json::Value = serde_json::from_str(&result.stdout).unwrap();
    assert_eq!(json["v"], 1);
    assert_eq!(json["id"], "job-spec01");
    assert_eq!(json["steps"].as_array().map(Vec::len), Some(2));
}

#[test]
fn unsupported_snapshot_version_is_rejected() {
    let project = Project::empty();
    let path = snapshot(&project, 7);
    cli().args(&["show", &path]).fails().stderr_has("unsupported snapshot version 7");
    cli().args(&["resume", &path]).fails().stderr_has("unsupported snapshot version 7");
}

#[cfg(unix)]
#[test]
fn resume_runs_the_remaining_steps() {
    let project = Project::empty();
    let path = snapshot(&project, 1);
    cli()
        .args(&["resume", &path])
        .passes()
        .stdout_has("finished")
        .stdout_has("resumed done")
        .stderr_has("warning: earlier warning");
    assert_eq!(project.read("again.txt"), "again\n");
}
