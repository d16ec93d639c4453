// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `qj defaults` specs

use crate::prelude::*;

#[test]
fn builtin_defaults_print_as_toml() {
    cli()
        .args(&["defaults"])
        .passes()
        .stdout_has("stderr_fatal = true")
        .stdout_has("[ssh]")
        .stdout_has("ssh_program = \"ssh\"")
        .stdout_has("[batch]");
}

#[test]
fn defaults_file_overrides_builtins() {
    let project = Project::empty();
    let path = project.file("defaults.toml", "host = \"cluster\"\npoll_interval_ms = 250\n\n[executables]\ng09 = \"/opt/g09/g09\"\n");
    let result = cli()
        .args(&["defaults", "--defaults", path.to_str().unwrap(), "--output", "json"])
        .passes();
    let json: serde_json::Value = serde_json::from_str(&result.stdout).unwrap();
    assert_eq!(json["host"], "cluster");
    assert_eq!(json["poll_interval_ms"], 250);
    assert_eq!(json["executables"]["g09"], "/opt/g09/g09");
}

#[test]
fn invalid_defaults_file_fails() {
    let project = Project::empty();
    let path = project.file("defaults.toml", "port = \"not a number\"\n");
    cli()
        .args(&["defaults", "--defaults", path.to_str().unwrap()])
        .fails()
        .stderr_has("cannot load defaults");
}
