// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qj-adapters: Process, remote shell, and submission adapters

pub mod batch;
pub mod quote;
pub mod subprocess;
pub mod transport;

pub use batch::{BatchError, GridService, JobDescription, QueueService, RemoteStatus, SubmissionService};
pub use subprocess::{
    CommandOutput, CommandSpec, Input, ProcessError, ProcessHandle, ProcessKiller, ProcessRunner,
    Redirect, StderrPolicy, WaitStatus,
};
pub use transport::{SshTransport, Transport, TransportError};

#[cfg(any(test, feature = "test-support"))]
pub use batch::{BatchCall, FakeSubmissionService};
#[cfg(any(test, feature = "test-support"))]
pub use transport::{FakeTransport, TransportCall};
