// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User defaults for job parameters and execution back ends.
//!
//! Defaults are an explicit value handed to the jobs that need them; there
//! is no process-wide mutable copy. They are read from
//! `$QJ_DEFAULTS`, then `<config dir>/qj/defaults.toml`, falling back to the
//! built-in values when neither exists.

use crate::job::{params, JobKind, Parameters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid defaults in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Remote shell and copy programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshDefaults {
    pub ssh_program: String,
    pub scp_program: String,
    /// Extra options passed to both programs (e.g. `-o BatchMode=yes`)
    pub options: Vec<String>,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

/// Queuing system commands run on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDefaults {
    /// Submits a script path; the last token of its stdout is the job id
    pub submit_command: String,
    /// Prints the state of a job id; empty output means it left the queue
    pub status_command: String,
    pub cancel_command: String,
    /// Prefix for resource directives in the generated script
    pub directive: String,
}

impl Default for BatchDefaults {
    fn default() -> Self {
        Self {
            submit_command: "sbatch".to_string(),
            status_command: "squeue -h -o %T -j".to_string(),
            cancel_command: "scancel".to_string(),
            directive: "#SBATCH".to_string(),
        }
    }
}

/// Grid submission client tools, run locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDefaults {
    pub submit_program: String,
    pub status_program: String,
    pub cancel_program: String,
    pub copy_program: String,
    /// Run-remote-command program used for directory and file removal
    pub exec_program: String,
}

impl Default for GridDefaults {
    fn default() -> Self {
        Self {
            submit_program: "globusrun".to_string(),
            status_program: "globus-job-status".to_string(),
            cancel_program: "globus-job-cancel".to_string(),
            copy_program: "globus-url-copy".to_string(),
            exec_program: "globus-job-run".to_string(),
        }
    }
}

/// User defaults consumed by `Job::update_parameters_from_defaults`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub local_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub remote_dir: Option<String>,
    pub contact: Option<String>,
    pub processors: Option<u32>,
    pub memory: Option<String>,
    pub queue: Option<String>,
    pub wall_time: Option<String>,
    pub account: Option<String>,
    /// Overrides the per-kind poll interval
    pub poll_interval_ms: Option<u64>,
    /// Treat any stderr output of blocking commands as failure
    pub stderr_fatal: bool,
    /// Program name to executable path
    pub executables: BTreeMap<String, String>,
    pub ssh: SshDefaults,
    pub batch: BatchDefaults,
    pub grid: GridDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            port: None,
            local_dir: None,
            scratch_dir: None,
            remote_dir: None,
            contact: None,
            processors: None,
            memory: None,
            queue: None,
            wall_time: None,
            account: None,
            poll_interval_ms: None,
            stderr_fatal: true,
            executables: BTreeMap::new(),
            ssh: SshDefaults::default(),
            batch: BatchDefaults::default(),
            grid: GridDefaults::default(),
        }
    }
}

impl Defaults {
    /// Load from the first existing defaults file, or built-in values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut defaults = match env::defaults_path() {
            Some(path) if path.exists() => Self::from_path(&path)?,
            _ => Self::default(),
        };
        if let Some(ms) = env::poll_interval_ms() {
            defaults.poll_interval_ms = Some(ms);
        }
        Ok(defaults)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Parameter values these defaults supply for a job of `kind`.
    ///
    /// `program` (the job's `program` parameter, if any) selects the
    /// executable path. Keys the kind does not accept are left out.
    pub fn parameters_for(&self, kind: JobKind, program: Option<&str>) -> Parameters {
        let mut out = Parameters::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                if kind.accepts(key) {
                    out.insert(key, value);
                }
            }
        };
        put(params::HOST, self.host.clone());
        put(params::USER, self.user.clone());
        put(params::PORT, self.port.map(|p| p.to_string()));
        put(params::LOCAL_DIR, self.local_dir.as_ref().map(|p| p.display().to_string()));
        put(params::SCRATCH_DIR, self.scratch_dir.as_ref().map(|p| p.display().to_string()));
        put(params::REMOTE_DIR, self.remote_dir.clone());
        put(params::CONTACT, self.contact.clone());
        put(params::PROCESSORS, self.processors.map(|n| n.to_string()));
        put(params::MEMORY, self.memory.clone());
        put(params::QUEUE, self.queue.clone());
        put(params::WALL_TIME, self.wall_time.clone());
        put(params::ACCOUNT, self.account.clone());
        put(params::POLL_INTERVAL_MS, self.poll_interval_ms.map(|ms| ms.to_string()));
        put(params::EXECUTABLE, program.and_then(|p| self.executables.get(p).cloned()));
        out
    }
}

/// Environment variable access for configuration.
pub mod env {
    use std::path::PathBuf;

    /// Defaults file: `QJ_DEFAULTS` > `<config dir>/qj/defaults.toml`
    pub fn defaults_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("QJ_DEFAULTS") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("qj").join("defaults.toml"))
    }

    /// Poll interval override (`QJ_POLL_INTERVAL_MS`)
    pub fn poll_interval_ms() -> Option<u64> {
        std::env::var("QJ_POLL_INTERVAL_MS").ok().and_then(|s| s.parse::<u64>().ok())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
