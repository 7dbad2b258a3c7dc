// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Displays test events on standard error.

use super::events::{CancelReason, ExecuteStatus, TestEvent, TestEventKind};
use crate::{
    helpers::{DisplayCounterIndex, plural},
    identity::TestIdentity,
    runner::{FinalRunStats, RunStats},
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::{OwoColorize, Style};
use swrite::{SWrite, swrite};
use std::{
    fmt,
    io::{self, IsTerminal, Write},
    time::Duration,
};
use testledger_metadata::TestResultSummary;

/// Status level to show in the reporter output.
///
/// Status levels are incremental: each level causes all the statuses listed above it to be
/// output.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum StatusLevel {
    /// No output.
    None,

    /// Only output test failures.
    Fail,

    /// Output passing tests in addition to failures.
    Pass,

    /// Output skipped tests in addition to all variants above.
    Skip,
}

impl StatusLevel {
    fn shows(self, result: TestResultSummary) -> bool {
        match result {
            TestResultSummary::Failure => self >= Self::Fail,
            TestResultSummary::Success => self >= Self::Pass,
            TestResultSummary::Skipped => self >= Self::Skip,
        }
    }
}

/// Standard error destination for the reporter.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum ReporterStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    ///
    /// If the terminal isn't piped, produce output to a progress bar.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug)]
pub struct ReporterBuilder {
    status_level: StatusLevel,
    should_colorize: bool,
    print_test_output: bool,
    hide_progress_bar: bool,
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        Self {
            status_level: StatusLevel::Pass,
            should_colorize: false,
            print_test_output: false,
            hide_progress_bar: false,
        }
    }
}

impl ReporterBuilder {
    /// Sets the kinds of statuses to output.
    pub fn set_status_level(&mut self, status_level: StatusLevel) -> &mut Self {
        self.status_level = status_level;
        self
    }

    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Set to true to print captured output of failing tests as they finish.
    pub fn set_print_test_output(&mut self, print_test_output: bool) -> &mut Self {
        self.print_test_output = print_test_output;
        self
    }

    /// Set to true to never show a progress bar.
    pub fn set_hide_progress_bar(&mut self, hide_progress_bar: bool) -> &mut Self {
        self.hide_progress_bar = hide_progress_bar;
        self
    }

    /// Creates a new reporter writing to `output`.
    pub fn build<'a>(&self, test_count: usize, output: ReporterStderr<'a>) -> DisplayReporter<'a> {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }

        let stderr = match output {
            ReporterStderr::Terminal if !self.hide_progress_bar && io::stderr().is_terminal() => {
                let bar = ProgressBar::with_draw_target(
                    Some(test_count as u64),
                    ProgressDrawTarget::stderr_with_hz(20),
                );
                let template = format!(
                    "{{prefix:>12}} [{{elapsed_precise:>9}}] {{wide_bar}} {{pos:>{width}}}/{{len:{width}}}: {{msg}}",
                    width = crate::helpers::usize_decimal_char_width(test_count),
                );
                if let Ok(style) = ProgressStyle::default_bar().template(&template) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar.set_prefix(format!("{}", "Running".style(styles.pass)));
                ReporterStderrImpl::TerminalWithBar(bar)
            }
            ReporterStderr::Terminal => ReporterStderrImpl::TerminalWithoutBar,
            ReporterStderr::Buffer(buf) => ReporterStderrImpl::Buffer(buf),
        };

        DisplayReporter {
            status_level: self.status_level,
            print_test_output: self.print_test_output,
            styles,
            stderr,
            failures: Vec::new(),
        }
    }
}

enum ReporterStderrImpl<'a> {
    TerminalWithBar(ProgressBar),
    TerminalWithoutBar,
    Buffer(&'a mut Vec<u8>),
}

/// Prints out test events as human-readable lines.
pub struct DisplayReporter<'a> {
    status_level: StatusLevel,
    print_test_output: bool,
    styles: Styles,
    stderr: ReporterStderrImpl<'a>,
    failures: Vec<(TestIdentity, Duration)>,
}

impl DisplayReporter<'_> {
    /// Reports a test event.
    pub fn report_event(&mut self, event: &TestEvent) -> io::Result<()> {
        let mut buf = Vec::new();
        self.write_event(event, &mut buf)?;

        match &mut self.stderr {
            ReporterStderrImpl::TerminalWithBar(bar) => {
                update_progress_bar(bar, event);
                if !buf.is_empty() {
                    // The bar is hidden while the lines are written, then redrawn.
                    bar.suspend(|| io::stderr().write_all(&buf))?;
                }
            }
            ReporterStderrImpl::TerminalWithoutBar => {
                if !buf.is_empty() {
                    io::stderr().write_all(&buf)?;
                }
            }
            ReporterStderrImpl::Buffer(out) => out.extend_from_slice(&buf),
        }
        Ok(())
    }

    /// Marks the reporter done, clearing the progress bar if there is one.
    pub fn finish(&mut self) {
        if let ReporterStderrImpl::TerminalWithBar(bar) = &self.stderr {
            bar.finish_and_clear();
        }
    }

    fn write_event(&mut self, event: &TestEvent, writer: &mut dyn Write) -> io::Result<()> {
        match &event.kind {
            TestEventKind::RunStarted {
                run_count,
                filtered_out,
                test_threads,
                resuming,
            } => {
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
                write!(
                    writer,
                    "{} {} with {} {}",
                    run_count.style(self.styles.count),
                    plural::tests_str(*run_count),
                    test_threads.style(self.styles.count),
                    if *test_threads == 1 { "thread" } else { "threads" },
                )?;
                if *filtered_out > 0 {
                    write!(
                        writer,
                        " ({} filtered out)",
                        filtered_out.style(self.styles.skip)
                    )?;
                }
                if *resuming {
                    write!(writer, ", resuming an earlier run")?;
                }
                writeln!(writer)?;
            }
            TestEventKind::TestStarted { .. } => {}
            TestEventKind::TestFinished {
                identity,
                status,
                current_stats,
                ..
            } => {
                if status.result == TestResultSummary::Failure {
                    self.failures.push((identity.clone(), status.duration));
                }
                if self.status_level.shows(status.result) {
                    let counter = DisplayCounterIndex::new(
                        current_stats.finished_count,
                        current_stats.initial_run_count,
                    );
                    self.write_status_line(identity, status, Some(counter), writer)?;
                }
                if status.result == TestResultSummary::Failure && self.print_test_output {
                    self.write_test_output(identity, status, writer)?;
                }
            }
            TestEventKind::TestsHanging { running, idle } => {
                write!(writer, "{:>12} ", "HANGING".style(self.styles.skip))?;
                writeln!(
                    writer,
                    "{}no test finished; {} {} running:",
                    DisplayBracketedDuration(*idle),
                    running.len().style(self.styles.count),
                    plural::tests_str(running.len()),
                )?;
                for identity in running {
                    writeln!(writer, "{:>12} {}", "", self.display_identity(identity))?;
                }
            }
            TestEventKind::RunBeginCancel { running, reason } => {
                write!(writer, "{:>12} ", "Cancelling".style(self.styles.fail))?;
                writeln!(
                    writer,
                    "due to {}: {} {} still running",
                    reason.to_static_str().style(self.styles.fail),
                    running.style(self.styles.count),
                    plural::tests_str(*running),
                )?;
                if *reason == CancelReason::TestFailure {
                    writeln!(
                        writer,
                        "{:>12} no new tests will be started (fail-fast)",
                        ""
                    )?;
                }
            }
            TestEventKind::RunFinished {
                elapsed, run_stats, ..
            } => {
                self.write_summary(*elapsed, run_stats, writer)?;
                let failures = std::mem::take(&mut self.failures);
                for (identity, duration) in &failures {
                    write!(writer, "{:>12} ", "FAIL".style(self.styles.fail))?;
                    writeln!(
                        writer,
                        "{}{}",
                        DisplayBracketedDuration(*duration),
                        self.display_identity(identity)
                    )?;
                }
            }
        }
        Ok(())
    }

    fn write_status_line(
        &self,
        identity: &TestIdentity,
        status: &ExecuteStatus,
        counter: Option<DisplayCounterIndex>,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        match status.result {
            TestResultSummary::Success => {
                write!(writer, "{:>12} ", "PASS".style(self.styles.pass))?;
            }
            TestResultSummary::Failure => {
                write!(writer, "{:>12} ", "FAIL".style(self.styles.fail))?;
            }
            TestResultSummary::Skipped => {
                write!(writer, "{:>12} ", "SKIP".style(self.styles.skip))?;
            }
        }

        write!(writer, "{}", DisplayBracketedDuration(status.duration))?;
        if let Some(counter) = counter {
            write!(writer, "{} ", counter.style(self.styles.count))?;
        }
        write!(writer, "{}", self.display_identity(identity))?;
        if status.result == TestResultSummary::Failure {
            write!(writer, " ({})", status.describe_exit())?;
        }
        writeln!(writer)
    }

    fn write_test_output(
        &self,
        identity: &TestIdentity,
        status: &ExecuteStatus,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        for (name, output) in [("STDOUT", &status.stdout), ("STDERR", &status.stderr)] {
            if output.is_empty() {
                continue;
            }
            let header = format!("--- {name}: {identity} ---");
            writeln!(writer, "\n{}", header.style(self.styles.fail_output))?;
            writer.write_all(output.as_bytes())?;
            if !output.ends_with('\n') {
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    fn write_summary(
        &self,
        elapsed: Duration,
        run_stats: &RunStats,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let summary_style = match run_stats.summarize_final() {
            FinalRunStats::Success => self.styles.pass,
            FinalRunStats::NoTestsRun => self.styles.skip,
            FinalRunStats::Failed { .. } | FinalRunStats::Cancelled => self.styles.fail,
        };
        write!(
            writer,
            "{}\n{:>12} ",
            "-".repeat(12),
            "Summary".style(summary_style)
        )?;
        write!(writer, "{}", DisplayBracketedDuration(elapsed))?;

        write!(writer, "{}", run_stats.finished_count.style(self.styles.count))?;
        if run_stats.finished_count != run_stats.initial_run_count {
            write!(
                writer,
                "/{}",
                run_stats.initial_run_count.style(self.styles.count)
            )?;
        }

        // Both initial and finished counts must be 1 for the singular form.
        let tests_str = plural::tests_plural_if(
            run_stats.initial_run_count != 1 || run_stats.finished_count != 1,
        );
        writeln!(
            writer,
            " {tests_str} run: {} passed, {} failed, {} skipped",
            run_stats.passed.style(self.styles.pass),
            run_stats.failed.style(self.styles.fail),
            run_stats.skipped.style(self.styles.skip),
        )
    }

    fn display_identity<'b>(&'b self, identity: &'b TestIdentity) -> DisplayIdentity<'b> {
        DisplayIdentity {
            identity,
            styles: &self.styles,
        }
    }
}

fn update_progress_bar(bar: &ProgressBar, event: &TestEvent) {
    match &event.kind {
        TestEventKind::TestStarted {
            running,
            current_stats,
            ..
        }
        | TestEventKind::TestFinished {
            running,
            current_stats,
            ..
        } => {
            bar.set_position(current_stats.finished_count as u64);
            let mut msg = format!("{running} running");
            if current_stats.failed > 0 {
                swrite!(msg, ", {} failed", current_stats.failed);
            }
            bar.set_message(msg);
        }
        TestEventKind::RunFinished { .. } => bar.finish_and_clear(),
        TestEventKind::RunStarted { .. }
        | TestEventKind::TestsHanging { .. }
        | TestEventKind::RunBeginCancel { .. } => {}
    }
}

struct DisplayIdentity<'a> {
    identity: &'a TestIdentity,
    styles: &'a Styles,
}

impl fmt::Display for DisplayIdentity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.identity.class_name().style(self.styles.class_name),
            self.identity.test_name().style(self.styles.test_name),
        )
    }
}

struct DisplayBracketedDuration(Duration);

impl fmt::Display for DisplayBracketedDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        write!(f, "[{:>8.3?}s] ", self.0.as_secs_f64())
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    fail_output: Style,
    class_name: Style,
    test_name: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.fail_output = Style::new().magenta();
        self.class_name = Style::new().cyan();
        self.test_name = Style::new().blue().bold();
    }
}
