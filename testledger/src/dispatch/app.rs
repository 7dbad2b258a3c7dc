// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level application and command routing.

use super::{
    common::CommonOpts, ingest::IngestOpts, plan::PlanOpts, run::RunOpts,
    show_config::ShowConfigOpts, status::StatusOpts,
};
use crate::{
    Result,
    output::{OutputContext, OutputWriter},
};
use clap::Subcommand;

/// Tracks test outcomes across runs of a large test suite, and reruns only what's needed.
///
/// Outcomes are recorded under the report directory. When the report directory already exists,
/// the next run is narrowed according to the run mode.
#[derive(Debug, clap::Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct TestledgerApp {
    #[clap(flatten)]
    common: CommonOpts,

    #[clap(subcommand)]
    command: Command,
}

impl TestledgerApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.common.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(&self.common, output, output_writer),
            Command::Plan(opts) => opts.exec(&self.common, output_writer),
            Command::Ingest(opts) => opts.exec(&self.common),
            Command::Status(opts) => opts.exec(&self.common, output, output_writer),
            Command::ShowConfig(opts) => opts.exec(&self.common, output_writer),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tests, recording each outcome
    ///
    /// Each test is run as its own process. If the report directory exists from an earlier run,
    /// only the tests selected by the run mode are run.
    Run(Box<RunOpts>),

    /// Print the rerun filters for an external test engine
    ///
    /// Filters are printed as `--include <Class.test>` and `--exclude <Class.test>` arguments, one
    /// per line. Nothing is written to the report directory.
    Plan(PlanOpts),

    /// Record outcomes reported by an external test engine
    ///
    /// Reads lifecycle events as JSON lines, one event per line.
    Ingest(IngestOpts),

    /// List recorded tests by status
    Status(StatusOpts),

    /// Show the resolved configuration
    ShowConfig(ShowConfigOpts),
}
