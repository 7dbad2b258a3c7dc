// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::common::{CommonOpts, MessageFormat};
use crate::{ExpectedError, Result, output::OutputWriter};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use testledger_metadata::TestledgerExitCode;
use testledger_runner::{
    config::ConfigOverrides,
    rerun::{RerunFilters, plan_filters},
    status_store::StatusStore,
};
use tracing::info;

#[derive(Debug, Args)]
pub(crate) struct PlanOpts {
    /// Output format
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t)]
    message_format: MessageFormat,
}

/// The JSON form of a plan.
#[derive(Debug, Serialize)]
struct PlanSummary {
    resuming: bool,
    mode: Option<String>,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl PlanOpts {
    pub(crate) fn exec(self, common: &CommonOpts, output_writer: &mut OutputWriter) -> Result<i32> {
        let config = common.load_config(ConfigOverrides::default())?;

        // Planning never creates the report directory: only an existing one narrows the run.
        let (resuming, filters) = match config.tracker() {
            Some(tracker) => {
                let store = StatusStore::new(tracker.report_dir);
                if store.exists() {
                    (true, plan_filters(tracker.mode, &store))
                } else {
                    info!("no earlier run at `{}`, every test will run", store.root());
                    (false, RerunFilters::run_all())
                }
            }
            None => {
                info!("report-dir or mode not set, every test will run");
                (false, RerunFilters::run_all())
            }
        };

        let mut writer = output_writer.stdout_writer();
        match self.message_format {
            MessageFormat::Plain => {
                for arg in filters.to_runner_args() {
                    writeln!(writer, "{arg}")
                        .map_err(|err| ExpectedError::WriteOutputError { err })?;
                }
            }
            MessageFormat::Json => {
                let summary = PlanSummary {
                    resuming,
                    mode: config.mode().map(|mode| mode.to_string()),
                    include: filters.include_patterns(),
                    exclude: filters.exclude_patterns(),
                };
                serde_json::to_writer_pretty(&mut writer, &summary)
                    .map_err(|err| ExpectedError::JsonSerializeError { err })?;
                writeln!(writer).map_err(|err| ExpectedError::WriteOutputError { err })?;
            }
        }
        writer
            .flush()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        Ok(TestledgerExitCode::OK)
    }
}
