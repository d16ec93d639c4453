// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types.

use qj_adapters::{BatchError, ProcessError, TransportError};
use qj_core::{JobKind, JobStatus, NotPersistable};
use std::path::PathBuf;
use thiserror::Error;

/// Failure inside a step handler.
///
/// Never crosses the worker boundary: the run loop turns it into a
/// `Failed` status with the error text as the job message.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("invalid value '{value}' for parameter '{key}'")]
    InvalidParameter { key: String, value: String },
    #[error("callback '{name}' panicked: {message}")]
    CallbackPanicked { name: String, message: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl StepError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StepError::Io { action, path, source }
    }
}

/// A job operation requested at the wrong time or with bad parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("cannot {op} a job that is {status}")]
    InvalidState { op: &'static str, status: JobStatus },
    #[error("parameter '{key}' does not apply to {kind} jobs")]
    InvalidParameter { key: String, kind: JobKind },
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("job could not be stopped")]
    StopTimeout,
    #[error("job finished as {0} before it could be stopped")]
    Finished(JobStatus),
    #[error("no detached callback named '{0}'")]
    UnknownCallback(String),
}

/// Errors saving or loading a stopped job.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error(transparent)]
    NotPersistable(#[from] NotPersistable),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
