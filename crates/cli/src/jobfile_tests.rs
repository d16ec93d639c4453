// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qj_core::{JobStatus, StepKind};

const WATER: &str = r#"
name = "water"
kind = "remote"

[parameters]
host = "cluster"
port = 2222
program = "g09"

[[steps]]
kind = "allocate_scratch"

[[steps]]
kind = "copy_out_file"
local = "water.com"
remote = "water.com"

[[steps]]
name = "optimize"
kind = "run_app"
command = "g09"
args = ["water.com"]
stdout = "water.log"

[[steps]]
kind = "delete_file"
path = "old.chk"
kill_on_error = false
warn_on_error = true
"#;

#[test]
fn parses_steps_and_parameters() {
    let file = JobFile::parse(WATER).unwrap();
    assert_eq!(file.name, "water");
    assert_eq!(file.kind, JobKind::Remote);
    assert_eq!(file.steps.len(), 4);
    assert_eq!(file.steps[2].name.as_deref(), Some("optimize"));
    assert!(file.steps[2].kill_on_error);
    assert!(!file.steps[3].kill_on_error);
    assert!(file.steps[3].warn_on_error);
}

#[test]
fn builds_an_idle_job() {
    let job = JobFile::parse(WATER).unwrap().into_job(&Defaults::default(), Path::new("/work")).unwrap();
    assert_eq!(job.status(), JobStatus::Idle);
    assert_eq!(job.parameter(params::PORT).as_deref(), Some("2222"));
    assert_eq!(job.parameter(params::LOCAL_DIR).as_deref(), Some("/work"));

    let steps = job.steps();
    let kinds: Vec<StepKind> = steps.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![StepKind::AllocateScratch, StepKind::CopyOutFile, StepKind::RunApp, StepKind::DeleteFile]
    );
    assert_eq!(steps[2].name(), "optimize");
}

#[test]
fn explicit_parameters_beat_defaults() {
    let defaults = Defaults {
        host: Some("fallback".to_string()),
        user: Some("chem".to_string()),
        local_dir: Some("/data".into()),
        executables: [("g09".to_string(), "/opt/g09/g09".to_string())].into(),
        ..Defaults::default()
    };
    let job = JobFile::parse(WATER).unwrap().into_job(&defaults, Path::new("/work")).unwrap();
    assert_eq!(job.parameter(params::HOST).as_deref(), Some("cluster"));
    assert_eq!(job.parameter(params::USER).as_deref(), Some("chem"));
    assert_eq!(job.parameter(params::LOCAL_DIR).as_deref(), Some("/data"));
    assert_eq!(job.parameter(params::EXECUTABLE).as_deref(), Some("/opt/g09/g09"));
}

#[test]
fn kind_defaults_to_local() {
    let file = JobFile::parse("name = \"quick\"").unwrap();
    assert_eq!(file.kind, JobKind::Local);
    assert!(file.steps.is_empty());
}

#[yare::parameterized(
    unknown_field = { "name = \"x\"\nqueue = \"short\"" },
    missing_name = { "kind = \"local\"" },
    unknown_kind = { "name = \"x\"\nkind = \"cloud\"" },
    unknown_step = { "name = \"x\"\n[[steps]]\nkind = \"teleport\"" },
)]
fn rejects_malformed_files(text: &str) {
    assert!(JobFile::parse(text).is_err());
}

#[yare::parameterized(
    foreign_key = { "name = \"x\"\n[parameters]\nhost = \"h\"", "does not apply to local jobs" },
    table_value = { "name = \"x\"\n[parameters.queue]\nname = \"short\"", "must be a string or number" },
)]
fn rejects_bad_parameters(text: &str, message: &str) {
    let err = JobFile::parse(text).unwrap().into_job(&Defaults::default(), Path::new(".")).unwrap_err();
    assert!(err.to_string().contains(message), "{err}");
}

#[test]
fn load_reports_the_path() {
    let err = JobFile::load(Path::new("/nonexistent/job.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/job.toml"));
}
