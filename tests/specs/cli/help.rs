// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs

use crate::prelude::*;

#[test]
fn qj_help_lists_subcommands() {
    cli()
        .args(&["--help"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("run")
        .stdout_has("resume")
        .stdout_has("show")
        .stdout_has("defaults");
}

#[test]
fn qj_run_help_mentions_save() {
    cli().args(&["run", "--help"]).passes().stdout_has("--save");
}

#[test]
fn qj_version_shows_version() {
    cli().args(&["--version"]).passes().stdout_has("0.2");
}

#[test]
fn qj_without_subcommand_is_a_usage_error() {
    cli().expect_code(2);
}
