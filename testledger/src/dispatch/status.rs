// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::common::{CommonOpts, MessageFormat};
use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputWriter},
};
use clap::Args;
use owo_colors::{OwoColorize, Style};
use std::{collections::BTreeMap, io::Write};
use testledger_metadata::TestledgerExitCode;
use testledger_runner::{
    config::ConfigOverrides,
    status_store::{StatusKind, StatusStore},
};
use tracing::info;

#[derive(Debug, Args)]
pub(crate) struct StatusOpts {
    /// Only list tests with these statuses: SUCCESS, FAILURE, PAST_FAILURE [default: all]
    #[arg(long, value_name = "KIND")]
    kind: Vec<StatusKind>,

    /// Output format
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t)]
    message_format: MessageFormat,
}

impl StatusOpts {
    pub(crate) fn exec(
        self,
        common: &CommonOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let config = common.load_config(ConfigOverrides::default())?;
        let Some(report_dir) = config.report_dir() else {
            return Err(ExpectedError::TrackingDisabled);
        };
        let store = StatusStore::new(report_dir);
        if !store.exists() {
            info!("no runs recorded at `{}`", store.root());
            return Ok(TestledgerExitCode::OK);
        }

        let kinds = if self.kind.is_empty() {
            StatusKind::ALL.to_vec()
        } else {
            self.kind
        };
        let mut by_kind = BTreeMap::new();
        for kind in kinds {
            let mut names: Vec<_> = store.scan(kind).map(|identity| identity.to_string()).collect();
            names.sort_unstable();
            by_kind.insert(kind, names);
        }

        let mut writer = output_writer.stdout_writer();
        let res = match self.message_format {
            MessageFormat::Plain => {
                let heading = if output.colorize_stdout() {
                    Style::new().bold()
                } else {
                    Style::new()
                };
                write_plain(&by_kind, heading, &mut writer)
            }
            MessageFormat::Json => {
                let json: BTreeMap<String, &Vec<String>> = by_kind
                    .iter()
                    .map(|(kind, names)| (kind.to_string(), names))
                    .collect();
                serde_json::to_writer_pretty(&mut writer, &json)
                    .map_err(|err| ExpectedError::JsonSerializeError { err })?;
                writeln!(writer)
            }
        };
        res.and_then(|()| writer.flush())
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        Ok(TestledgerExitCode::OK)
    }
}

fn write_plain(
    by_kind: &BTreeMap<StatusKind, Vec<String>>,
    heading: Style,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    for (kind, names) in by_kind {
        writeln!(writer, "{} ({}):", kind.style(heading), names.len())?;
        for name in names {
            writeln!(writer, "    {name}")?;
        }
    }
    Ok(())
}
