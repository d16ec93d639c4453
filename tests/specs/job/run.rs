// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `qj run` specs for local jobs

use crate::prelude::*;

#[cfg(unix)]
#[test]
fn local_job_runs_to_done() {
    let project = Project::empty();
    let job = project.file(
        "greet.toml",
        r#"
name = "greet"

[[steps]]
kind = "run_app"
command = "echo"
args = ["hello"]
"#,
    );
    cli().args(&["run", job.to_str().unwrap()]).passes().stdout_has("hello\n").stdout_has("greet done");
}

#[cfg(unix)]
#[test]
fn steps_run_in_the_job_file_directory() {
    let project = Project::empty();
    project.file("input.dat", "geometry\n");
    project.file(
        "staged.toml",
        r#"
name = "staged"
kind = "local"

[[steps]]
kind = "run_app_via_shell"
command = "cat input.dat > output.dat"

[[steps]]
kind = "delete_file"
path = "input.dat"
"#,
    );
    // Relative job path: the directory comes from the file, not the cwd
    cli().args(&["run", "staged.toml"]).pwd(project.path()).passes().stdout_has("staged done");
    assert_eq!(project.read("output.dat"), "geometry\n");
    assert!(!project.exists("input.dat"));
}

#[cfg(unix)]
#[test]
fn failing_step_fails_the_job() {
    let project = Project::empty();
    let job = project.file(
        "broken.toml",
        r#"
name = "broken"

[[steps]]
kind = "run_app_via_shell"
command = "echo 'no basis set' >&2; exit 3"

[[steps]]
kind = "run_app_via_shell"
command = "touch never.txt"
"#,
    );
    cli()
        .args(&["run", job.to_str().unwrap()])
        .expect_code(1)
        .stdout_has("broken failed")
        .stderr_has("no basis set");
    assert!(!project.exists("never.txt"));
}

#[cfg(unix)]
#[test]
fn non_fatal_failure_only_warns() {
    let project = Project::empty();
    let job = project.file(
        "tolerant.toml",
        r#"
name = "tolerant"

[[steps]]
kind = "delete_file"
path = "missing.chk"
kill_on_error = false
warn_on_error = true

[[steps]]
kind = "run_app"
command = "echo"
args = ["after"]
"#,
    );
    cli()
        .args(&["run", job.to_str().unwrap()])
        .passes()
        .stdout_has("after")
        .stdout_has("tolerant done")
        .stderr_has("warning:");
}

#[test]
fn missing_program_fails_the_job() {
    let project = Project::empty();
    let job = project.file(
        "ghost.toml",
        r#"
name = "ghost"

[[steps]]
kind = "run_app"
command = "qj-no-such-program"
"#,
    );
    cli()
        .args(&["run", job.to_str().unwrap()])
        .expect_code(1)
        .stderr_has("qj-no-such-program");
}

#[test]
fn remote_job_without_host_is_rejected() {
    let project = Project::empty();
    let job = project.file("far.toml", "name = \"far\"\nkind = \"remote\"\n");
    cli()
        .args(&["run", job.to_str().unwrap()])
        .fails()
        .stderr_has("missing required parameter 'host'");
}

#[test]
fn malformed_job_file_is_rejected() {
    let project = Project::empty();
    let job = project.file("bad.toml", "name = \"bad\"\nkind = \"cloud\"\n");
    cli().args(&["run", job.to_str().unwrap()]).fails().stderr_has("invalid job file");
}

#[test]
fn parameter_for_another_kind_is_rejected() {
    let project = Project::empty();
    let job = project.file("mixed.toml", "name = \"mixed\"\n\n[parameters]\nqueue = \"short\"\n");
    cli()
        .args(&["run", job.to_str().unwrap()])
        .fails()
        .stderr_has("does not apply to local jobs")
        .stdout_lacks("mixed done");
}
