// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::output::{print_json, OutputFormat};
use clap::Args;
use qj_core::Defaults;

#[derive(Args)]
pub struct DefaultsArgs {
    #[arg(long = "output", short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,
}

/// Print the defaults jobs would be configured from.
pub fn defaults(args: DefaultsArgs, defaults: &Defaults) -> anyhow::Result<()> {
    match args.output {
        OutputFormat::Json => print_json(defaults),
        OutputFormat::Text => {
            print!("{}", toml::to_string_pretty(defaults)?);
            Ok(())
        }
    }
}
