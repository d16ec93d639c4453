// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{Job, JobRunner};
use qj_core::test_support::{run_step_index, staging_steps};
use qj_core::{params, AppSpec, JobKind, JobStatus, JobStep, StepKind, StepRecordOutcome};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn local_job(dir: &Path, poll_ms: u64) -> Job {
    let job = Job::new("local", JobKind::Local);
    job.set_parameter(params::LOCAL_DIR, dir.display().to_string()).unwrap();
    job.set_parameter(params::POLL_INTERVAL_MS, poll_ms.to_string()).unwrap();
    job
}

fn add_steps(job: &Job, steps: Vec<JobStep>) {
    for step in steps {
        job.add_step(step).unwrap();
    }
}

async fn wait_for_step(job: &Job, index: usize) {
    for _ in 0..400 {
        if job.active_step() == Some(index) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("step {} never became active", index);
}

#[cfg(unix)]
#[tokio::test]
async fn staging_sequence_runs_to_done() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.dat"), "input").unwrap();
    let job = local_job(dir.path(), 200);
    add_steps(&job, staging_steps("echo", &["hello"]));

    assert_eq!(job.run().await.unwrap(), JobStatus::Done);
    assert!(job.warnings().is_empty());

    let history = job.step_history();
    assert_eq!(history.len(), 4);
    // out.log never existed
    assert!(matches!(history[0].outcome, StepRecordOutcome::Failed(_)));
    assert_eq!(history[2].stdout.as_deref(), Some("hello\n"));
    assert_eq!(std::fs::read_to_string(dir.path().join("in.dat")).unwrap(), "input");
}

#[cfg(unix)]
#[tokio::test]
async fn scratch_directory_is_allocated_and_cleaned() {
    let dir = TempDir::new().unwrap();
    let scratch_base = dir.path().join("scratch");
    std::fs::write(dir.path().join("in.dat"), "abc").unwrap();
    let job = local_job(dir.path(), 200);
    job.set_parameter(params::SCRATCH_DIR, scratch_base.display().to_string()).unwrap();
    let app = AppSpec {
        stdin: Some("in.dat".into()),
        stdout: Some("out.dat".into()),
        ..AppSpec::new("cat")
    };
    add_steps(
        &job,
        vec![
            JobStep::allocate_scratch(),
            JobStep::copy_out("in.dat", "in.dat"),
            JobStep::run_app(app),
            JobStep::copy_back("out.dat", "result.dat"),
            JobStep::clean_scratch(),
        ],
    );

    assert_eq!(job.run().await.unwrap(), JobStatus::Done, "{:?}", job.message());
    assert_eq!(std::fs::read_to_string(dir.path().join("result.dat")).unwrap(), "abc");
    assert!(!scratch_base.join(job.id().as_str()).exists());
    assert!(scratch_base.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn cleaning_unallocated_scratch_keeps_local_directory() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    add_steps(&job, vec![JobStep::allocate_scratch(), JobStep::clean_scratch()]);

    assert_eq!(job.run().await.unwrap(), JobStatus::Done);
    assert!(dir.path().exists());
}

#[cfg(unix)]
#[tokio::test]
async fn shell_step_sees_redirects_and_keeps_stderr() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    let app = AppSpec { stdout: Some("out.txt".into()), ..AppSpec::new("echo").arg("via shell") };
    add_steps(
        &job,
        vec![
            JobStep::run_app_via_shell(app),
            JobStep::run_app_via_shell(AppSpec::new("echo progress >&2")),
        ],
    );

    assert_eq!(job.run().await.unwrap(), JobStatus::Done);
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "via shell\n");
    // Applications may chatter on stderr without failing
    assert_eq!(job.step_history()[1].stderr.as_deref(), Some("progress\n"));
}

#[cfg(unix)]
#[tokio::test]
async fn non_zero_exit_fails_the_step() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    add_steps(&job, vec![JobStep::run_app(AppSpec::new("sh").args(["-c", "echo broken >&2; exit 4"]))]);

    assert_eq!(job.run().await.unwrap(), JobStatus::Failed);
    assert_eq!(job.message().as_deref(), Some("broken"));
    assert_eq!(job.active_step(), Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn missing_program_fails_the_job() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    add_steps(&job, vec![JobStep::run_app(AppSpec::new("qj-no-such-program")).kill_on_error(false)]);

    // A program that cannot start is a job error even for a non-fatal step
    assert_eq!(job.run().await.unwrap(), JobStatus::Failed);
    assert!(job.message().unwrap().contains("qj-no-such-program"));
}

#[cfg(unix)]
#[tokio::test]
async fn empty_command_uses_executable_parameter() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    job.set_parameter(params::EXECUTABLE, "echo").unwrap();
    add_steps(&job, vec![JobStep::run_app(AppSpec::new("").arg("from parameter"))]);

    assert_eq!(job.run().await.unwrap(), JobStatus::Done);
    assert_eq!(job.step_history()[0].stdout.as_deref(), Some("from parameter\n"));
}

#[tokio::test]
async fn empty_command_without_executable_is_an_error() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    add_steps(&job, vec![JobStep::run_app(AppSpec::new(""))]);

    assert_eq!(job.run().await.unwrap(), JobStatus::Failed);
    assert_eq!(job.message().as_deref(), Some("missing required parameter 'executable'"));
}

#[cfg(unix)]
#[tokio::test]
async fn stop_terminates_application_within_two_poll_intervals() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("in.dat"), "input").unwrap();
    let job = local_job(dir.path(), 200);
    let steps = staging_steps("sleep", &["5"]);
    let run_index = run_step_index(&steps).unwrap();
    add_steps(&job, steps);

    let runner = JobRunner::start(job.clone());
    wait_for_step(&job, run_index).await;
    let started = Instant::now();
    job.stop().await.unwrap();
    assert!(started.elapsed() <= Duration::from_millis(400));

    assert_eq!(runner.join().await.unwrap(), JobStatus::Stopped);
    let steps = job.steps();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].kind(), StepKind::RunApp);
    assert_eq!(run_step_index(&steps), Some(0));
    assert!(job.can_resume());
}

#[cfg(unix)]
#[tokio::test]
async fn kill_terminates_application() {
    let dir = TempDir::new().unwrap();
    let job = local_job(dir.path(), 200);
    add_steps(&job, vec![JobStep::run_app(AppSpec::new("sleep").arg("5"))]);

    let runner = JobRunner::start(job.clone());
    wait_for_step(&job, 0).await;
    let started = Instant::now();
    job.kill().await;

    assert_eq!(runner.join().await.unwrap(), JobStatus::Killed);
    assert!(started.elapsed() < Duration::from_secs(2));
}
