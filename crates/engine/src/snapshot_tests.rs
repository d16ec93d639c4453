// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qj_core::{params, AppSpec};
use tempfile::TempDir;

/// A local job parked as Stopped with two steps left.
fn stopped_job(dir: &Path) -> Job {
    let job = Job::new("water opt", JobKind::Local);
    job.set_parameter(params::LOCAL_DIR, dir.display().to_string()).unwrap();
    job.add_step(JobStep::run_app_via_shell(AppSpec::new("echo resumed > resumed.txt"))).unwrap();
    job.add_step(JobStep::delete_file("gone.log").kill_on_error(false).warn_on_error(true)).unwrap();
    {
        let mut state = job.inner.state.lock();
        state.status = JobStatus::Stopped;
        state.can_resume = true;
        state.warnings.push("earlier warning".to_string());
    }
    job
}

#[test]
fn save_requires_a_stopped_job() {
    let dir = TempDir::new().unwrap();
    let job = Job::new("idle", JobKind::Local);
    let err = job.save(&dir.path().join("job.json")).unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::Protocol(ProtocolError::InvalidState { status: JobStatus::Idle, .. })
    ));
}

#[test]
fn save_marks_the_job_saved() {
    let dir = TempDir::new().unwrap();
    let job = stopped_job(dir.path());
    let path = dir.path().join("saved").join("job.json");

    job.save(&path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
    assert_eq!(job.status(), JobStatus::Saved);
    assert!(!job.can_resume());
}

#[cfg(unix)]
#[tokio::test]
async fn loaded_job_resumes_to_the_same_end() {
    let dir = TempDir::new().unwrap();
    let job = stopped_job(dir.path());
    job.inner.state.lock().remote_id = Some("4242".to_string());
    let path = dir.path().join("job.json");
    job.save(&path).unwrap();

    let loaded = Job::load(&path, &Defaults::default()).unwrap();
    assert_eq!(loaded.id(), job.id());
    assert_eq!(loaded.name(), "water opt");
    assert_eq!(loaded.kind(), JobKind::Local);
    assert_eq!(loaded.status(), JobStatus::Stopped);
    assert!(loaded.can_resume());
    assert_eq!(loaded.step_count(), 2);
    assert_eq!(loaded.remote_id().as_deref(), Some("4242"));
    assert_eq!(loaded.parameters(), job.parameters());

    assert_eq!(loaded.run().await.unwrap(), JobStatus::Done);
    assert_eq!(std::fs::read_to_string(dir.path().join("resumed.txt")).unwrap(), "resumed\n");
    // Warnings from before the save carry over
    assert_eq!(loaded.warnings().len(), 2);

    // The saved job cannot run again
    assert!(job.run().await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn callbacks_are_left_out_and_reattached_on_load() {
    let dir = TempDir::new().unwrap();
    let job = stopped_job(dir.path());
    job.inner.state.lock().steps.push(
        JobStep::callback("load results", || (0, String::new())).kill_on_error(false).warn_on_error(true),
    );
    let path = dir.path().join("job.json");
    job.save(&path).unwrap();
    assert_eq!(job.status(), JobStatus::Saved);

    let snapshot = JobSnapshot::read(&path).unwrap();
    assert_eq!(snapshot.steps.len(), 2);
    assert_eq!(
        snapshot.callbacks,
        vec![DetachedCallback {
            index: 2,
            name: "load results".to_string(),
            kill_on_error: false,
            warn_on_error: true,
        }]
    );

    let loaded = Job::load(&path, &Defaults::default()).unwrap();
    assert_eq!(loaded.step_count(), 3);
    assert_eq!(loaded.detached_callbacks(), vec!["load results"]);

    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    loaded
        .reattach_callback("load results", move || {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            (0, String::new())
        })
        .unwrap();
    assert!(loaded.detached_callbacks().is_empty());
    let steps = loaded.steps();
    assert_eq!(steps[2].name(), "load results");
    assert!(!steps[2].is_kill_on_error());
    assert!(steps[2].is_warn_on_error());

    assert_eq!(loaded.run().await.unwrap(), JobStatus::Done);
    assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn callback_left_detached_fails_the_step() {
    let dir = TempDir::new().unwrap();
    let job = Job::new("results only", JobKind::Local);
    job.set_parameter(params::LOCAL_DIR, dir.path().display().to_string()).unwrap();
    job.add_step(JobStep::callback("load results", || (0, String::new()))).unwrap();
    {
        let mut state = job.inner.state.lock();
        state.status = JobStatus::Stopped;
        state.can_resume = true;
    }
    let path = dir.path().join("job.json");
    job.save(&path).unwrap();

    let loaded = Job::load(&path, &Defaults::default()).unwrap();
    assert!(matches!(
        loaded.reattach_callback("tidy", || (0, String::new())),
        Err(ProtocolError::UnknownCallback(name)) if name == "tidy"
    ));
    assert_eq!(loaded.run().await.unwrap(), JobStatus::Failed);
    assert!(loaded.message().unwrap().contains("'load results' was not reattached"));
}

#[test]
fn snapshot_json_uses_short_version_key() {
    let dir = TempDir::new().unwrap();
    let snapshot = JobSnapshot::capture(&stopped_job(dir.path())).unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["v"], CURRENT_SNAPSHOT_VERSION);
    assert_eq!(json["kind"], "local");
    assert_eq!(json["steps"][0]["kind"], "run_app_via_shell");
}

#[test]
fn unsupported_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut snapshot = JobSnapshot::capture(&stopped_job(dir.path())).unwrap();
    snapshot.version = 99;
    let path = dir.path().join("future.json");
    std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

    assert!(matches!(JobSnapshot::read(&path), Err(SnapshotError::UnsupportedVersion(99))));
}

#[test]
fn garbage_is_a_json_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.json");
    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(JobSnapshot::read(&path), Err(SnapshotError::Json(_))));
    assert!(matches!(
        JobSnapshot::read(&dir.path().join("missing.json")),
        Err(SnapshotError::Io { .. })
    ));
}

#[test]
fn saving_over_a_snapshot_keeps_backups() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("job.json");
    for _ in 0..4 {
        stopped_job(dir.path()).save(&path).unwrap();
    }
    assert!(path.exists());
    assert!(path.with_extension("bak").exists());
    assert!(path.with_extension("bak.2").exists());
    assert!(path.with_extension("bak.3").exists());
    assert!(!path.with_extension("bak.4").exists());
}
