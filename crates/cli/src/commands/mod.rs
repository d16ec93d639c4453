// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod defaults;
pub mod run;
pub mod show;

use anyhow::Context;
use qj_core::Defaults;
use std::path::Path;

/// Defaults from `--defaults`, else `QJ_DEFAULTS` or the user config dir.
pub fn load_defaults(path: Option<&Path>) -> anyhow::Result<Defaults> {
    match path {
        Some(path) => Defaults::from_path(path).context("cannot load defaults"),
        None => Defaults::load().context("cannot load defaults"),
    }
}
