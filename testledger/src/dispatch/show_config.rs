// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::common::CommonOpts;
use crate::{ExpectedError, Result, output::OutputWriter};
use camino::Utf8PathBuf;
use clap::Args;
use std::io::Write;
use swrite::{SWrite, swriteln};
use testledger_metadata::TestledgerExitCode;
use testledger_runner::config::{ConfigOverrides, TestledgerConfig};

#[derive(Debug, Args)]
pub(crate) struct ShowConfigOpts {}

impl ShowConfigOpts {
    pub(crate) fn exec(self, common: &CommonOpts, output_writer: &mut OutputWriter) -> Result<i32> {
        let config = common.load_config(ConfigOverrides::default())?;
        let rendered = render_config(&config);

        let mut writer = output_writer.stdout_writer();
        writer
            .write_all(rendered.as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|err| ExpectedError::WriteOutputError { err })?;
        Ok(TestledgerExitCode::OK)
    }
}

fn render_config(config: &TestledgerConfig) -> String {
    let mut out = String::new();
    let config_file = config.config_file();
    swriteln!(
        out,
        "config-file: {}{}",
        config_file,
        if config_file.exists() { "" } else { " (not found)" },
    );
    swriteln!(out, "report-dir: {}", display_opt(config.report_dir()));
    swriteln!(out, "mode: {}", display_opt(config.mode()));
    swriteln!(out, "tracking-enabled: {}", config.tracker().is_some());
    match config.configured_test_threads() {
        Some(threads) => swriteln!(out, "test-threads: {threads} ({})", config.test_threads()),
        None => swriteln!(out, "test-threads: default ({})", config.test_threads()),
    }
    swriteln!(
        out,
        "large-machine-threshold: {}",
        config.large_machine_threshold()
    );
    swriteln!(
        out,
        "refresh-seconds: {}",
        config.refresh_interval().as_secs()
    );
    swriteln!(
        out,
        "product-namespaces: {}",
        config.product_namespaces().join(", ")
    );
    swriteln!(out, "fail-fast: {}", config.fail_fast());
    swriteln!(
        out,
        "hang-timeout: {}",
        humantime::format_duration(config.hang_timeout())
    );
    swriteln!(out, "timestamp-file: {}", display_opt(config.timestamp_file()));
    swriteln!(out, "classpath: {}", join_paths(&config.classpath()));
    swriteln!(out, "fixtures: {}", join_paths(&config.fixtures()));
    swriteln!(out, "skip-exit-code: {}", config.skip_exit_code());
    out
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "(unset)".to_owned(), |value| value.to_string())
}

fn join_paths(paths: &[Utf8PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
