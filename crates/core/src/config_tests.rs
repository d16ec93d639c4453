// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

const DEFAULTS_TOML: &str = r#"
host = "hpc.example.org"
user = "alice"
remote_dir = "/scratch/alice"
processors = 16
queue = "short"
stderr_fatal = false

[executables]
gamess = "/opt/gamess/rungms"

[batch]
submit_command = "qsub"
status_command = "qstat -f"
"#;

#[test]
fn parses_partial_file_over_builtin_defaults() {
    let defaults: Defaults = toml::from_str(DEFAULTS_TOML).unwrap();
    assert_eq!(defaults.host.as_deref(), Some("hpc.example.org"));
    assert_eq!(defaults.processors, Some(16));
    assert!(!defaults.stderr_fatal);
    assert_eq!(defaults.batch.submit_command, "qsub");
    // Unspecified fields keep their built-in values
    assert_eq!(defaults.batch.cancel_command, "scancel");
    assert_eq!(defaults.ssh.ssh_program, "ssh");
}

#[test]
fn builtin_defaults_treat_stderr_as_fatal() {
    assert!(Defaults::default().stderr_fatal);
}

#[test]
fn parameters_for_filters_by_kind() {
    let defaults: Defaults = toml::from_str(DEFAULTS_TOML).unwrap();

    let local = defaults.parameters_for(JobKind::Local, None);
    assert!(!local.contains(params::HOST));
    assert_eq!(local.get(params::PROCESSORS), Some("16"));

    let batch = defaults.parameters_for(JobKind::RemoteBatch, None);
    assert_eq!(batch.get(params::HOST), Some("hpc.example.org"));
    assert_eq!(batch.get(params::QUEUE), Some("short"));
    assert_eq!(batch.get(params::REMOTE_DIR), Some("/scratch/alice"));

    let remote = defaults.parameters_for(JobKind::Remote, None);
    assert!(!remote.contains(params::QUEUE));
}

#[test]
fn parameters_for_resolves_program_executable() {
    let defaults: Defaults = toml::from_str(DEFAULTS_TOML).unwrap();
    let p = defaults.parameters_for(JobKind::Local, Some("gamess"));
    assert_eq!(p.get(params::EXECUTABLE), Some("/opt/gamess/rungms"));
    let p = defaults.parameters_for(JobKind::Local, Some("mopac"));
    assert!(!p.contains(params::EXECUTABLE));
}

#[test]
fn from_path_reports_parse_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("defaults.toml");
    std::fs::write(&path, "processors = \"many\"").unwrap();
    let err = Defaults::from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("defaults.toml"));
}

#[test]
#[serial]
fn load_reads_file_named_by_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("defaults.toml");
    std::fs::write(&path, DEFAULTS_TOML).unwrap();

    std::env::set_var("QJ_DEFAULTS", &path);
    std::env::set_var("QJ_POLL_INTERVAL_MS", "125");
    let defaults = Defaults::load();
    std::env::remove_var("QJ_DEFAULTS");
    std::env::remove_var("QJ_POLL_INTERVAL_MS");

    let defaults = defaults.unwrap();
    assert_eq!(defaults.user.as_deref(), Some("alice"));
    assert_eq!(defaults.poll_interval_ms, Some(125));
}

#[test]
#[serial]
fn load_falls_back_to_builtin_when_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("QJ_DEFAULTS", dir.path().join("missing.toml"));
    let defaults = Defaults::load();
    std::env::remove_var("QJ_DEFAULTS");
    assert_eq!(defaults.unwrap(), Defaults::default());
}
