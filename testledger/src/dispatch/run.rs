// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::common::CommonOpts;
use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputWriter},
};
use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use testledger_metadata::TestledgerExitCode;
use testledger_runner::{
    config::{ConfigOverrides, TestThreads},
    coordinator::RunCoordinator,
    partition::PartitionerBuilder,
    reporter::{ReporterBuilder, StatusLevel},
    rerun::RerunFilters,
    runner::{FinalRunStats, TestCommand, TestRunnerBuilder},
    test_filter::{MismatchReason, TestFilterBuilder, TestFilterPatterns},
    test_list::TestList,
};
use tracing::{info, warn};

#[derive(Debug, Args)]
pub(crate) struct RunOpts {
    /// File listing the tests to run, one `<class-name> <test-name>` per line
    #[arg(long, short = 'l', value_name = "PATH")]
    test_list: Utf8PathBuf,

    /// Command template that runs a single test
    ///
    /// The template is split like a shell command line. `{class}` and `{test}` are replaced by
    /// the class and test names.
    #[arg(
        long,
        short = 'c',
        value_name = "TEMPLATE",
        conflicts_with = "command_args",
        required_unless_present = "command_args"
    )]
    command: Option<String>,

    /// Name of the suite in the report
    #[arg(long, value_name = "NAME", default_value = "testledger")]
    suite_name: String,

    #[clap(flatten)]
    filter: FilterOpts,

    #[clap(flatten)]
    runner: RunnerOpts,

    #[clap(flatten)]
    reporter: ReporterOpts,

    /// Command that runs a single test, with `{class}` and `{test}` placeholders
    #[arg(last = true, value_name = "COMMAND")]
    command_args: Vec<String>,
}

impl RunOpts {
    pub(crate) fn exec(
        self,
        common: &CommonOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let config = common.load_config(ConfigOverrides {
            test_threads: self.runner.test_threads,
            fail_fast: self.runner.fail_fast(),
            ..ConfigOverrides::default()
        })?;
        config.check_fixtures()?;

        let test_list = TestList::from_path(&self.test_list)?;
        let command = match self.command {
            Some(template) => TestCommand::parse(&template, config.classpath()),
            None => TestCommand::from_args(self.command_args, config.classpath()),
        }
        .map_err(ExpectedError::executor)?;

        let mut coordinator = RunCoordinator::from_config(&config);
        if !coordinator.is_enabled() {
            info!("report-dir or mode not set, results will not be recorded");
        }
        let rerun = coordinator
            .init()
            .map_err(|err| ExpectedError::CoordinatorError { err })?;
        if rerun.matches_nothing() {
            info!(
                "no tests match mode `{}`",
                config.mode().unwrap_or_default()
            );
        }

        let builder = self.filter.make_test_filter_builder(rerun)?;
        let filtered = test_list.filter(&builder);
        for reason in [
            MismatchReason::Rerun,
            MismatchReason::String,
            MismatchReason::Partition,
        ] {
            let count = filtered.skip_count(reason);
            if count > 0 {
                info!("{count} tests skipped: {reason}");
            }
        }

        let mut runner_builder = TestRunnerBuilder::default();
        if let Some(hang_timeout) = self.runner.hang_timeout {
            runner_builder.set_hang_timeout(hang_timeout.into());
        }
        if let Some(timestamp_file) = self.runner.timestamp_file {
            runner_builder.set_timestamp_file(timestamp_file);
        }
        let runner = runner_builder
            .build(
                self.suite_name,
                &filtered.matched,
                filtered.skipped.len(),
                command,
                &config,
            )
            .map_err(ExpectedError::executor)?;

        let mut reporter = self
            .reporter
            .to_builder(output)
            .build(filtered.matched.len(), output_writer.reporter_output());
        let mut report_error = None;
        let run_stats = runner
            .execute(&mut coordinator, |event| {
                if report_error.is_none() {
                    if let Err(err) = reporter.report_event(&event) {
                        report_error = Some(err);
                    }
                }
            })
            .map_err(ExpectedError::executor)?;
        reporter.finish();
        coordinator
            .finish()
            .map_err(|err| ExpectedError::CoordinatorError { err })?;

        if let Some(err) = report_error {
            return Err(ExpectedError::WriteOutputError { err });
        }

        match run_stats.summarize_final() {
            FinalRunStats::Success => Ok(TestledgerExitCode::OK),
            FinalRunStats::NoTestsRun => {
                warn!("no tests to run");
                Ok(TestledgerExitCode::NO_TESTS_RUN)
            }
            FinalRunStats::Cancelled | FinalRunStats::Failed { .. } => {
                Err(ExpectedError::TestRunFailed)
            }
        }
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Filter options")]
struct FilterOpts {
    /// Run only tests whose `Class.test` name contains one of these substrings
    #[arg(value_name = "FILTERS")]
    filters: Vec<String>,

    /// Skip tests whose `Class.test` name contains one of these substrings
    #[arg(long, value_name = "PATTERN")]
    skip: Vec<String>,

    /// Run only one shard of the selected tests: `count:M/N` or `hash:M/N`
    #[arg(long, value_name = "PARTITION")]
    partition: Option<PartitionerBuilder>,
}

impl FilterOpts {
    fn make_test_filter_builder(&self, rerun: RerunFilters) -> Result<TestFilterBuilder> {
        let mut patterns = TestFilterPatterns::new(self.filters.clone());
        for skip in &self.skip {
            patterns.add_skip_pattern(skip.clone());
        }
        Ok(TestFilterBuilder::new(
            rerun,
            patterns,
            self.partition,
        )?)
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of tests to run simultaneously [possible values: integer or "num-cpus"]
    #[arg(
        long,
        short = 'j',
        visible_alias = "jobs",
        value_name = "THREADS",
        env = "TESTLEDGER_TEST_THREADS",
        allow_negative_numbers = true
    )]
    test_threads: Option<TestThreads>,

    /// Stop scheduling new tests after the first failure
    #[arg(long, overrides_with = "no_fail_fast")]
    fail_fast: bool,

    /// Run every test regardless of failures
    #[arg(long, overrides_with = "fail_fast")]
    no_fail_fast: bool,

    /// Warn when no test has finished for this long (`0s` disables)
    #[arg(long, value_name = "DURATION")]
    hang_timeout: Option<humantime::Duration>,

    /// File to touch every time a test finishes
    #[arg(long, value_name = "PATH")]
    timestamp_file: Option<Utf8PathBuf>,
}

impl RunnerOpts {
    fn fail_fast(&self) -> Option<bool> {
        if self.fail_fast {
            Some(true)
        } else if self.no_fail_fast {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StatusLevelOpt {
    None,
    Fail,
    Pass,
    Skip,
}

impl From<StatusLevelOpt> for StatusLevel {
    fn from(opt: StatusLevelOpt) -> Self {
        match opt {
            StatusLevelOpt::None => StatusLevel::None,
            StatusLevelOpt::Fail => StatusLevel::Fail,
            StatusLevelOpt::Pass => StatusLevel::Pass,
            StatusLevelOpt::Skip => StatusLevel::Skip,
        }
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Reporter options")]
struct ReporterOpts {
    /// Test statuses to output
    #[arg(long, value_enum, value_name = "LEVEL", env = "TESTLEDGER_STATUS_LEVEL")]
    status_level: Option<StatusLevelOpt>,

    /// Print the captured output of failing tests as they finish
    #[arg(long)]
    print_test_output: bool,

    /// Do not display the progress bar
    #[arg(long, env = "TESTLEDGER_HIDE_PROGRESS_BAR", value_parser = clap::builder::BoolishValueParser::new())]
    hide_progress_bar: bool,
}

impl ReporterOpts {
    fn to_builder(&self, output: OutputContext) -> ReporterBuilder {
        let mut builder = ReporterBuilder::default();
        builder
            .set_colorize(output.colorize_stderr())
            .set_print_test_output(self.print_test_output)
            .set_hide_progress_bar(self.hide_progress_bar);
        if let Some(status_level) = self.status_level {
            builder.set_status_level(status_level.into());
        }
        builder
    }
}
