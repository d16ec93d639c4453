// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TOML job description read by `qj run`.
//!
//! ```toml
//! name = "water"
//! kind = "local"
//!
//! [parameters]
//! program = "g09"
//!
//! [[steps]]
//! kind = "run_app"
//! command = "g09"
//! args = ["water.com"]
//! ```

use anyhow::{bail, Context};
use qj_core::{params, Defaults, JobKind, StepSpec};
use qj_engine::{executor, Job};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    pub name: String,
    #[serde(default)]
    pub kind: JobKind,
    /// Scalars only; numbers and booleans are stored as their text
    #[serde(default)]
    pub parameters: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl JobFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read job file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid job file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build the job: explicit parameters first, then `defaults` for the
    /// rest. `base_dir` is the local directory when neither sets one.
    pub fn into_job(self, defaults: &Defaults, base_dir: &Path) -> anyhow::Result<Job> {
        let job = Job::with_executor(self.name, self.kind, executor::for_kind(self.kind, defaults));
        for (key, value) in self.parameters {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(n) => n.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => bail!("parameter '{key}' must be a string or number, not {}", other.type_str()),
            };
            job.set_parameter(&key, text)?;
        }
        job.update_parameters_from_defaults(defaults);
        if job.parameter(params::LOCAL_DIR).is_none() {
            job.set_parameter(params::LOCAL_DIR, base_dir.display().to_string())?;
        }
        for step in self.steps {
            job.add_step(step.into())?;
        }
        Ok(job)
    }
}

#[cfg(test)]
#[path = "jobfile_tests.rs"]
mod tests;
