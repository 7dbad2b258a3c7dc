// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{ExpectedError, Result, output::OutputOpts};
use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use testledger_runner::{
    config::{ConfigOverrides, DefaultConfigWarnings, EnvOverrides, TestledgerConfig},
    run_mode::RunMode,
};

/// Options shared by every command.
#[derive(Debug, Args)]
pub(crate) struct CommonOpts {
    /// Directory that relative paths in the config are resolved against [default: current
    /// directory]
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) root: Option<Utf8PathBuf>,

    /// Config file [default: <root>/.config/testledger.toml]
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config_file: Option<Utf8PathBuf>,

    /// Directory status records and the HTML report are written to
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) report_dir: Option<Utf8PathBuf>,

    /// Which tests to run when resuming: all, outstanding, failing, past-failing
    #[arg(long, global = true, value_name = "MODE")]
    pub(crate) mode: Option<RunMode>,

    #[clap(flatten)]
    pub(crate) output: OutputOpts,
}

impl CommonOpts {
    /// Reads the layered configuration and applies `overrides` plus the common flags on top.
    pub(crate) fn load_config(&self, overrides: ConfigOverrides) -> Result<TestledgerConfig> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => {
                let current_dir = std::env::current_dir()
                    .map_err(|err| ExpectedError::CurrentDirFailed { err })?;
                Utf8PathBuf::try_from(current_dir)
                    .map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })?
            }
        };

        let mut config = TestledgerConfig::from_sources(
            root,
            self.config_file.as_deref(),
            &EnvOverrides::from_env(),
            &mut DefaultConfigWarnings,
        )?;
        config.apply_overrides(ConfigOverrides {
            report_dir: self.report_dir.clone(),
            mode: self.mode,
            ..overrides
        });
        Ok(config)
    }
}

/// The format for machine-readable output on stdout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum MessageFormat {
    /// One item per line.
    #[default]
    Plain,

    /// A single JSON document.
    Json,
}
