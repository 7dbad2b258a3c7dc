// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestCommand;
use crate::{
    config::{TestThreads, TestledgerConfig},
    coordinator::{FinishedTest, RunCoordinator},
    errors::{CoordinatorError, DisplayErrorChain, ExecutorError},
    identity::TestIdentity,
    reporter::{CancelReason, ExecuteStatus, TestEvent, TestEventKind},
    time::{StopwatchStart, stopwatch},
};
use camino::Utf8PathBuf;
use chrono::Local;
use future_queue::{FutureQueueContext, StreamExt as _};
use futures::prelude::*;
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};
use testledger_metadata::TestResultSummary;
use tokio::{runtime::Runtime, sync::mpsc};
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
    fail_fast: Option<bool>,
    hang_timeout: Option<Duration>,
    timestamp_file: Option<Utf8PathBuf>,
    skip_exit_code: Option<i32>,
}

impl TestRunnerBuilder {
    /// Sets the number of tests to run simultaneously.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets whether to stop scheduling tests after the first failure.
    pub fn set_fail_fast(&mut self, fail_fast: bool) -> &mut Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    /// Sets the period after which running tests are reported as possibly hung. Zero disables
    /// hang detection.
    pub fn set_hang_timeout(&mut self, hang_timeout: Duration) -> &mut Self {
        self.hang_timeout = Some(hang_timeout);
        self
    }

    /// Sets the file touched after each finished test.
    pub fn set_timestamp_file(&mut self, timestamp_file: Utf8PathBuf) -> &mut Self {
        self.timestamp_file = Some(timestamp_file);
        self
    }

    /// Sets the exit code with which a test command reports a skipped test.
    pub fn set_skip_exit_code(&mut self, skip_exit_code: i32) -> &mut Self {
        self.skip_exit_code = Some(skip_exit_code);
        self
    }

    /// Creates a new test runner for `tests`.
    ///
    /// Settings not set on the builder are taken from `config`.
    pub fn build<'a>(
        self,
        suite_name: impl Into<String>,
        tests: &'a [TestIdentity],
        filtered_out: usize,
        command: TestCommand,
        config: &TestledgerConfig,
    ) -> Result<TestRunner<'a>, ExecutorError> {
        let test_threads = match self.test_threads {
            Some(test_threads) => test_threads.compute(),
            None => config.test_threads(),
        };
        let hang_timeout = self.hang_timeout.unwrap_or_else(|| config.hang_timeout());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("testledger-runner-worker")
            .build()
            .map_err(ExecutorError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                suite_name: suite_name.into(),
                tests,
                filtered_out,
                command,
                test_threads,
                fail_fast: self.fail_fast.unwrap_or_else(|| config.fail_fast()),
                hang_timeout: (!hang_timeout.is_zero()).then_some(hang_timeout),
                timestamp_file: self.timestamp_file.or_else(|| config.timestamp_file()),
                skip_exit_code: self
                    .skip_exit_code
                    .unwrap_or_else(|| config.skip_exit_code()),
            },
            runtime,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a> {
    inner: TestRunnerInner<'a>,
    runtime: Runtime,
}

impl TestRunner<'_> {
    /// Returns the number of tests run simultaneously.
    pub fn test_threads(&self) -> usize {
        self.inner.test_threads
    }

    /// Executes the tests, each one in its own process, as one suite of `coordinator`.
    ///
    /// The callback is called with each event. Results are recorded through the coordinator,
    /// which must be between suites. If recording fails, no new tests are started and the first
    /// error is returned once running tests finish.
    pub fn execute<F>(
        self,
        coordinator: &mut RunCoordinator,
        mut callback: F,
    ) -> Result<RunStats, ExecutorError>
    where
        F: FnMut(TestEvent),
    {
        let Self { inner, runtime } = self;
        let res = runtime.block_on(inner.execute(coordinator, &mut callback));

        // Child processes are killed on drop, so there's nothing left to wait for.
        runtime.shutdown_background();
        res
    }
}

#[derive(Debug)]
struct TestRunnerInner<'a> {
    suite_name: String,
    tests: &'a [TestIdentity],
    filtered_out: usize,
    command: TestCommand,
    test_threads: usize,
    fail_fast: bool,
    hang_timeout: Option<Duration>,
    timestamp_file: Option<Utf8PathBuf>,
    skip_exit_code: i32,
}

enum InternalEvent {
    Started {
        identity: TestIdentity,
    },
    Finished {
        identity: TestIdentity,
        status: ExecuteStatus,
    },
}

impl TestRunnerInner<'_> {
    async fn execute(
        &self,
        coordinator: &mut RunCoordinator,
        callback: &mut dyn FnMut(TestEvent),
    ) -> Result<RunStats, ExecutorError> {
        let mut ctx = CallbackContext {
            callback,
            stopwatch: stopwatch(),
        };
        let mut run_stats = RunStats {
            initial_run_count: self.tests.len(),
            ..RunStats::default()
        };

        coordinator.before_suite(&self.suite_name)?;
        ctx.emit(TestEventKind::RunStarted {
            run_count: self.tests.len(),
            filtered_out: self.filtered_out,
            test_threads: self.test_threads,
            resuming: coordinator.is_resuming(),
        });

        let cancelled = AtomicBool::new(false);
        let cancelled_ref = &cancelled;
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<InternalEvent>();

        let run_fut = futures::stream::iter(self.tests)
            .map(move |identity| {
                let this_resp_tx = resp_tx.clone();
                let fut = move |_cx: FutureQueueContext| async move {
                    if cancelled_ref.load(Ordering::Acquire) {
                        // Scheduling stopped.
                        return;
                    }

                    // Failure to send means the receiver was dropped.
                    let _ = this_resp_tx.send(InternalEvent::Started {
                        identity: identity.clone(),
                    });
                    let status = self.run_test(identity).await;
                    if self.fail_fast && status.result == TestResultSummary::Failure {
                        // Stop scheduling before the next test is pulled from the queue.
                        cancelled_ref.store(true, Ordering::Release);
                    }
                    let _ = this_resp_tx.send(InternalEvent::Finished {
                        identity: identity.clone(),
                        status,
                    });
                };
                (1, fut)
            })
            // future_queue means tests are spawned in order but returned in any order.
            .future_queue(self.test_threads)
            .collect::<()>();

        let mut first_error: Option<CoordinatorError> = None;
        let mut cancel_reason: Option<CancelReason> = None;
        let exec_fut = async {
            let mut running = BTreeSet::new();
            let mut idle_since = Instant::now();
            let hang_sleep = tokio::time::sleep(self.hang_timeout.unwrap_or(Duration::MAX));
            tokio::pin!(hang_sleep);

            loop {
                tokio::select! {
                    event = resp_rx.recv() => {
                        let Some(event) = event else {
                            // All tests have finished or were never started.
                            break;
                        };
                        match event {
                            InternalEvent::Started { identity } => {
                                if first_error.is_none() {
                                    if let Err(error) = coordinator.before_test(&identity) {
                                        self.begin_cancel(
                                            &mut ctx,
                                            cancelled_ref,
                                            &mut cancel_reason,
                                            running.len(),
                                            CancelReason::ReportError,
                                        );
                                        first_error = Some(error);
                                    }
                                }
                                running.insert(identity.clone());
                                ctx.emit(TestEventKind::TestStarted {
                                    identity,
                                    running: running.len(),
                                    current_stats: run_stats,
                                });
                            }
                            InternalEvent::Finished { identity, status } => {
                                running.remove(&identity);
                                run_stats.on_test_finished(status.result);
                                idle_since = Instant::now();
                                if let Some(hang_timeout) = self.hang_timeout {
                                    hang_sleep
                                        .as_mut()
                                        .reset(tokio::time::Instant::now() + hang_timeout);
                                }
                                self.touch_timestamp_file();

                                if first_error.is_none() {
                                    let finished = FinishedTest {
                                        identity: identity.clone(),
                                        result: status.result,
                                        duration: status.duration,
                                        stack_trace: None,
                                        stdout: status.stdout.clone(),
                                        stderr: status.stderr.clone(),
                                    };
                                    if let Err(error) = coordinator.after_test(finished) {
                                        self.begin_cancel(
                                            &mut ctx,
                                            cancelled_ref,
                                            &mut cancel_reason,
                                            running.len(),
                                            CancelReason::ReportError,
                                        );
                                        first_error = Some(error);
                                    }
                                }

                                let failed = status.result == TestResultSummary::Failure;
                                ctx.emit(TestEventKind::TestFinished {
                                    identity,
                                    status,
                                    running: running.len(),
                                    current_stats: run_stats,
                                });

                                if failed && self.fail_fast {
                                    self.begin_cancel(
                                        &mut ctx,
                                        cancelled_ref,
                                        &mut cancel_reason,
                                        running.len(),
                                        CancelReason::TestFailure,
                                    );
                                }
                            }
                        }
                    }
                    () = &mut hang_sleep, if self.hang_timeout.is_some() => {
                        let idle = idle_since.elapsed();
                        if !running.is_empty() {
                            warn!(
                                idle = %humantime::format_duration(round_to_secs(idle)),
                                running = %running
                                    .iter()
                                    .map(|identity: &TestIdentity| identity.to_string())
                                    .collect::<Vec<_>>()
                                    .join(", "),
                                "no test has finished recently, tests may be hung"
                            );
                            ctx.emit(TestEventKind::TestsHanging {
                                running: running.iter().cloned().collect(),
                                idle,
                            });
                        }
                        if let Some(hang_timeout) = self.hang_timeout {
                            hang_sleep
                                .as_mut()
                                .reset(tokio::time::Instant::now() + hang_timeout);
                        }
                    }
                }
            }
        };

        futures::join!(run_fut, exec_fut);

        if let Some(error) = first_error {
            return Err(error.into());
        }

        coordinator.after_suite(&self.suite_name, None)?;
        let snapshot = ctx.stopwatch.snapshot();
        ctx.emit(TestEventKind::RunFinished {
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
            run_stats,
        });

        Ok(run_stats)
    }

    fn begin_cancel(
        &self,
        ctx: &mut CallbackContext<'_>,
        cancelled: &AtomicBool,
        cancel_reason: &mut Option<CancelReason>,
        running: usize,
        reason: CancelReason,
    ) {
        cancelled.store(true, Ordering::Release);
        // Only the first cancellation is reported.
        if cancel_reason.is_none() {
            debug!(reason = reason.to_static_str(), "no new tests will be started");
            *cancel_reason = Some(reason);
            ctx.emit(TestEventKind::RunBeginCancel { running, reason });
        }
    }

    /// Runs an individual test in its own process.
    async fn run_test(&self, identity: &TestIdentity) -> ExecuteStatus {
        debug!(%identity, "running test");
        let stopwatch = stopwatch();
        let mut cmd = self.command.to_command(identity);

        match cmd.output().await {
            Ok(output) => {
                let result = if output.status.success() {
                    TestResultSummary::Success
                } else if output.status.code() == Some(self.skip_exit_code) {
                    TestResultSummary::Skipped
                } else {
                    TestResultSummary::Failure
                };
                ExecuteStatus {
                    result,
                    exit_status: Some(output.status),
                    duration: stopwatch.snapshot().duration,
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            Err(error) => ExecuteStatus {
                result: TestResultSummary::Failure,
                exit_status: None,
                duration: stopwatch.snapshot().duration,
                stdout: String::new(),
                stderr: format!(
                    "error spawning test command: {:#}\n",
                    DisplayErrorChain::new(&error)
                ),
            },
        }
    }

    fn touch_timestamp_file(&self) {
        let Some(path) = &self.timestamp_file else {
            return;
        };
        let contents = format!("{}\n", Local::now().to_rfc3339());
        if let Err(error) = std::fs::write(path, contents) {
            warn!(
                %path,
                error = %DisplayErrorChain::new(&error),
                "failed to update timestamp file"
            );
        }
    }
}

fn round_to_secs(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}

struct CallbackContext<'a> {
    callback: &'a mut dyn FnMut(TestEvent),
    stopwatch: StopwatchStart,
}

impl CallbackContext<'_> {
    fn emit(&mut self, kind: TestEventKind) {
        (self.callback)(TestEvent {
            timestamp: Local::now(),
            elapsed: self.stopwatch.snapshot().duration,
            kind,
        });
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    ///
    /// If the test run is cancelled, this will be more than `finished_count` at the end.
    pub initial_run_count: usize,

    /// The total number of tests that finished running.
    pub finished_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that reported themselves as skipped.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if there are any failures recorded in the stats.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Summarizes the stats as an enum at the end of a test run.
    pub fn summarize_final(&self) -> FinalRunStats {
        if self.initial_run_count == 0 {
            FinalRunStats::NoTestsRun
        } else if self.failed > 0 {
            FinalRunStats::Failed {
                failed: self.failed,
            }
        } else if self.finished_count < self.initial_run_count {
            FinalRunStats::Cancelled
        } else {
            FinalRunStats::Success
        }
    }

    fn on_test_finished(&mut self, result: TestResultSummary) {
        self.finished_count += 1;
        match result {
            TestResultSummary::Success => self.passed += 1,
            TestResultSummary::Failure => self.failed += 1,
            TestResultSummary::Skipped => self.skipped += 1,
        }
    }
}

/// A type summarizing the possible outcomes of a test run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FinalRunStats {
    /// The test run was successful, or is successful so far.
    Success,

    /// The test run was successful, or is successful so far, but no tests were selected to run.
    NoTestsRun,

    /// The run was cancelled before every test started, without any failures.
    Cancelled,

    /// At least one test failed.
    Failed {
        /// The number of failed tests.
        failed: usize,
    },
}
