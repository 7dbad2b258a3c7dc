// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::common::CommonOpts;
use crate::{ExpectedError, Result};
use camino::Utf8PathBuf;
use clap::Args;
use std::io::{BufRead, BufReader};
use testledger_metadata::{EventSummary, TestledgerExitCode};
use testledger_runner::{config::ConfigOverrides, coordinator::RunCoordinator};
use tracing::info;

#[derive(Debug, Args)]
pub(crate) struct IngestOpts {
    /// Read events from this file instead of standard input
    #[arg(long, value_name = "PATH")]
    input: Option<Utf8PathBuf>,
}

impl IngestOpts {
    pub(crate) fn exec(self, common: &CommonOpts) -> Result<i32> {
        let config = common.load_config(ConfigOverrides::default())?;
        config.check_fixtures()?;

        let mut coordinator = RunCoordinator::from_config(&config);
        if !coordinator.is_enabled() {
            return Err(ExpectedError::TrackingDisabled);
        }
        coordinator
            .init()
            .map_err(|err| ExpectedError::CoordinatorError { err })?;

        let reader: Box<dyn BufRead> = match &self.input {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|err| {
                    ExpectedError::InputFileReadError {
                        path: path.clone(),
                        err,
                    }
                })?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(std::io::stdin().lock()),
        };

        for event in EventSummary::parse_stream(reader) {
            coordinator
                .handle_event(event?)
                .map_err(|err| ExpectedError::CoordinatorError { err })?;
        }
        let counts = coordinator
            .finish()
            .map_err(|err| ExpectedError::CoordinatorError { err })?;

        info!(
            "recorded {} tests: {} passed, {} failed, {} skipped",
            counts.total, counts.passed, counts.failed, counts.skipped,
        );
        Ok(TestledgerExitCode::OK)
    }
}
