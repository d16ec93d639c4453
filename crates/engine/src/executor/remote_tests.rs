// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{Job, JobRunner};
use qj_adapters::{FakeTransport, TransportCall};
use qj_core::{JobKind, JobStatus, JobStep, StepRecordOutcome};
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    job: Job,
    transport: FakeTransport,
    local: TempDir,
    remote: TempDir,
}

fn harness(steps: Vec<JobStep>) -> Harness {
    let transport = FakeTransport::default();
    let executor = RemoteExecutor::with_transport(Arc::new(transport.clone()), ProcessRunner::default());
    let job = Job::with_executor("remote", JobKind::Remote, Arc::new(executor));
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    job.set_parameter(params::HOST, "cluster").unwrap();
    job.set_parameter(params::LOCAL_DIR, local.path().display().to_string()).unwrap();
    job.set_parameter(params::REMOTE_DIR, remote.path().display().to_string()).unwrap();
    job.set_parameter(params::POLL_INTERVAL_MS, "100").unwrap();
    for step in steps {
        job.add_step(step).unwrap();
    }
    Harness { job, transport, local, remote }
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
async fn staged_remote_run_completes() {
    let h = harness(vec![
        JobStep::allocate_scratch(),
        JobStep::copy_out("in.dat", "in.dat"),
        JobStep::run_app(AppSpec::new("cat").arg("in.dat")),
        JobStep::copy_back("in.dat", "out.dat"),
        JobStep::clean_scratch(),
    ]);
    std::fs::write(h.local.path().join("in.dat"), "payload").unwrap();

    assert_eq!(h.job.run().await.unwrap(), JobStatus::Done, "{:?}", h.job.message());

    let scratch = format!("{}/{}", h.remote.path().display(), h.job.id());
    assert_eq!(h.job.step_history()[2].stdout.as_deref(), Some("payload"));
    assert_eq!(std::fs::read_to_string(h.local.path().join("out.dat")).unwrap(), "payload");
    assert!(!std::path::Path::new(&scratch).exists());

    let calls = h.transport.calls();
    assert_eq!(calls[0], TransportCall::Run(format!("mkdir -p {}", quote_arg(&scratch))));
    assert!(matches!(&calls[1], TransportCall::Upload { remote, .. } if *remote == format!("{scratch}/in.dat")));
    assert!(matches!(&calls[2], TransportCall::Spawn(script) if script.contains("cat in.dat")));
    assert_eq!(calls[4], TransportCall::Run(format!("rm -rf {}", quote_arg(&scratch))));
}

#[cfg(unix)]
#[tokio::test]
async fn missing_remote_file_is_a_step_failure() {
    let h = harness(vec![
        JobStep::delete_file("out.log").kill_on_error(false).warn_on_error(true),
        JobStep::copy_back("never-made.dat", "never-made.dat").kill_on_error(false),
    ]);

    assert_eq!(h.job.run().await.unwrap(), JobStatus::Done);
    assert_eq!(h.job.warnings().len(), 1);
    assert!(h
        .job
        .step_history()
        .iter()
        .all(|r| matches!(r.outcome, StepRecordOutcome::Failed(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn unreachable_host_fails_even_non_fatal_steps() {
    let h = harness(vec![JobStep::delete_file("out.log").kill_on_error(false), JobStep::clean_scratch()]);
    h.transport.set_unreachable(true);

    assert_eq!(h.job.run().await.unwrap(), JobStatus::Failed);
    assert_eq!(h.job.active_step(), Some(0));
    assert!(h.job.message().unwrap().starts_with("cannot reach"));
}

#[cfg(unix)]
#[tokio::test]
async fn application_failure_reports_stderr() {
    let h = harness(vec![JobStep::run_app_via_shell(AppSpec::new("echo 'no basis set' >&2; exit 3"))]);

    assert_eq!(h.job.run().await.unwrap(), JobStatus::Failed);
    assert_eq!(h.job.message().as_deref(), Some("no basis set"));
}

#[cfg(unix)]
#[tokio::test]
async fn kill_runs_kill_command_and_drops_the_session() {
    let h = harness(vec![JobStep::run_app(AppSpec::new("sleep").arg("5"))]);
    let marker = h.remote.path().join("killed");
    h.job
        .set_parameter(params::KILL_COMMAND, format!("touch {}", quote_arg(&marker.display().to_string())))
        .unwrap();

    let runner = JobRunner::start(h.job.clone());
    wait_for_step(&h.job, 0).await;
    h.job.kill().await;

    assert_eq!(runner.join().await.unwrap(), JobStatus::Killed);
    assert!(marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn kill_without_kill_command_terminates_the_session() {
    let h = harness(vec![JobStep::run_app(AppSpec::new("sleep").arg("5"))]);

    let runner = JobRunner::start(h.job.clone());
    wait_for_step(&h.job, 0).await;
    let started = std::time::Instant::now();
    h.job.kill().await;

    assert_eq!(runner.join().await.unwrap(), JobStatus::Killed);
    assert!(started.elapsed() < Duration::from_secs(2));
}
