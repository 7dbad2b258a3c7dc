// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{helpers::display_exited_with, identity::TestIdentity, runner::RunStats};
use chrono::{DateTime, Local};
use std::{process::ExitStatus, time::Duration};
use testledger_metadata::TestResultSummary;

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and consumed by a
/// [`DisplayReporter`](crate::reporter::DisplayReporter).
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated.
    pub timestamp: DateTime<Local>,

    /// The amount of time elapsed since the start of the test run.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

/// The kind of test event this is.
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// The test run started.
    RunStarted {
        /// The number of tests that will be run.
        run_count: usize,

        /// The number of tests filtered out before the run.
        filtered_out: usize,

        /// The number of tests run at the same time.
        test_threads: usize,

        /// Whether the run resumes an earlier one.
        resuming: bool,
    },

    /// A test started running.
    TestStarted {
        /// The test.
        identity: TestIdentity,

        /// The number of tests currently running, including this one.
        running: usize,

        /// Statistics for the run so far.
        current_stats: RunStats,
    },

    /// A test finished running.
    TestFinished {
        /// The test.
        identity: TestIdentity,

        /// How the test ran.
        status: ExecuteStatus,

        /// The number of tests still running.
        running: usize,

        /// Statistics for the run so far, including this test.
        current_stats: RunStats,
    },

    /// No test finished for a while.
    TestsHanging {
        /// The tests currently running.
        running: Vec<TestIdentity>,

        /// How long it has been since a test last finished, or since the run started.
        idle: Duration,
    },

    /// No new tests will be started.
    RunBeginCancel {
        /// The number of tests still running. They are allowed to finish.
        running: usize,

        /// The reason the run is being cancelled.
        reason: CancelReason,
    },

    /// The test run finished.
    RunFinished {
        /// The time at which the run started.
        start_time: DateTime<Local>,

        /// The amount of time the run took.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

/// The reason a run was cancelled.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum CancelReason {
    /// A test failed and fail-fast is enabled.
    TestFailure,

    /// Recording a result failed.
    ReportError,
}

impl CancelReason {
    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            Self::TestFailure => "test failure",
            Self::ReportError => "reporting error",
        }
    }
}

/// How a single test process ran.
#[derive(Clone, Debug)]
pub struct ExecuteStatus {
    /// The result, derived from the exit status.
    pub result: TestResultSummary,

    /// The exit status of the process, or `None` if it could not be started.
    pub exit_status: Option<ExitStatus>,

    /// How long the test took.
    pub duration: Duration,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error. If the process could not be started, this holds the error.
    pub stderr: String,
}

impl ExecuteStatus {
    /// Describes how the process ended.
    pub fn describe_exit(&self) -> String {
        match self.exit_status {
            Some(exit_status) => display_exited_with(exit_status),
            None => "failed to start".to_owned(),
        }
    }
}
