// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fluent helpers for running `qj` against a scratch project.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `qj` with an isolated environment: no user defaults, no color.
pub fn cli() -> CliBuilder {
    CliBuilder { args: Vec::new(), dir: None }
}

pub struct CliBuilder {
    args: Vec<String>,
    dir: Option<PathBuf>,
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn pwd(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("qj").unwrap();
        cmd.args(&self.args)
            .env("QJ_DEFAULTS", "/nonexistent/qj-defaults.toml")
            .env("QJ_LOG", "warn")
            .env("NO_COLOR", "1")
            .env_remove("QJ_POLL_INTERVAL_MS");
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    pub fn passes(self) -> RunResult {
        self.expect_code(0)
    }

    pub fn fails(self) -> RunResult {
        let output = self.command().output().unwrap();
        let result = RunResult::from(output);
        assert_ne!(result.code, 0, "expected failure\nstdout: {}\nstderr: {}", result.stdout, result.stderr);
        result
    }

    pub fn expect_code(self, code: i32) -> RunResult {
        let output = self.command().output().unwrap();
        let result = RunResult::from(output);
        assert_eq!(
            result.code, code,
            "unexpected exit code\nstdout: {}\nstderr: {}",
            result.stdout, result.stderr
        );
        result
    }
}

pub struct RunResult {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for RunResult {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl RunResult {
    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(self.stdout.contains(needle), "stdout missing {needle:?}:\n{}", self.stdout);
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(self.stderr.contains(needle), "stderr missing {needle:?}:\n{}", self.stderr);
        self
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        assert!(!self.stdout.contains(needle), "stdout has {needle:?}:\n{}", self.stdout);
        self
    }
}

/// Temporary directory holding job files and their data.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn empty() -> Self {
        Self { dir: TempDir::new().unwrap() }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }
}
