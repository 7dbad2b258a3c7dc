// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run coordinator: the single owner of the status store and the report for one run.
//!
//! The coordinator is driven through lifecycle hooks, either by the process executor or by
//! events read from a test engine. The hooks must be called in order:
//!
//! ```text
//! init -> (before_suite -> (before_test | after_test)* -> after_suite)* -> finish
//! ```
//!
//! Calling a hook out of order returns a [`CoordinatorStateError`]. If no report directory or
//! run mode is configured, the coordinator still checks hook order and counts results, but
//! nothing is planned or persisted.

use crate::{
    config::{TestledgerConfig, TrackerSettings},
    diagnostics::{CapturedDiagnostics, StackTraceFilter},
    errors::{CoordinatorError, CoordinatorStateError},
    identity::TestIdentity,
    report::{ReportSink, detail_url},
    rerun::{RerunFilters, plan_filters},
    run_mode::RunMode,
    status_store::{StatusKind, StatusStore, result_to_status},
};
use std::{fmt, time::Duration};
use testledger_metadata::{EventSummary, SuiteCounts, TestResultSummary};
use tracing::{debug, info};

/// The lifecycle state of a [`RunCoordinator`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoordinatorState {
    /// `init` has not been called yet.
    Init,

    /// Between suites.
    Ready,

    /// A suite is running.
    Executing,

    /// The run is over. No further hooks may be called.
    Finalized,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "not initialized"),
            Self::Ready => write!(f, "between suites"),
            Self::Executing => write!(f, "executing a suite"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// A test that finished, along with everything the engine captured for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinishedTest {
    /// The test.
    pub identity: TestIdentity,

    /// The result reported for the test.
    pub result: TestResultSummary,

    /// How long the test took.
    pub duration: Duration,

    /// The stack trace that failed the test, if the engine reported one.
    pub stack_trace: Option<String>,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,
}

#[derive(Debug)]
struct Tracker {
    store: StatusStore,
    sink: ReportSink,
    mode: RunMode,
    began: bool,
}

/// Coordinates one run: plans the rerun filters, then records each finished test and each
/// finished suite.
#[derive(Debug)]
pub struct RunCoordinator {
    tracker: Option<Tracker>,
    stack_trace_filter: StackTraceFilter,
    state: CoordinatorState,
    resuming: bool,
    current_suite: Option<String>,
    suite_counts: SuiteCounts,
    run_counts: SuiteCounts,
}

impl RunCoordinator {
    /// Creates a new coordinator.
    ///
    /// With `tracker` set to `None`, the coordinator passes every test through and persists
    /// nothing.
    pub fn new(
        tracker: Option<TrackerSettings>,
        refresh: Duration,
        stack_trace_filter: StackTraceFilter,
    ) -> Self {
        let tracker = tracker.map(|settings| Tracker {
            sink: ReportSink::new(&settings.report_dir, refresh),
            store: StatusStore::new(settings.report_dir),
            mode: settings.mode,
            began: false,
        });
        Self {
            tracker,
            stack_trace_filter,
            state: CoordinatorState::Init,
            resuming: false,
            current_suite: None,
            suite_counts: SuiteCounts::default(),
            run_counts: SuiteCounts::default(),
        }
    }

    /// Creates a new coordinator from configuration.
    pub fn from_config(config: &TestledgerConfig) -> Self {
        Self::new(
            config.tracker(),
            config.refresh_interval(),
            StackTraceFilter::new(config.product_namespaces().iter().cloned()),
        )
    }

    /// Returns true if results are being persisted.
    pub fn is_enabled(&self) -> bool {
        self.tracker.is_some()
    }

    /// Returns the status store, if tracking is enabled.
    pub fn store(&self) -> Option<&StatusStore> {
        self.tracker.as_ref().map(|tracker| &tracker.store)
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Returns true if `init` found a report directory from an earlier run.
    pub fn is_resuming(&self) -> bool {
        self.resuming
    }

    /// Returns the counts for every test recorded so far, across suites.
    pub fn run_counts(&self) -> SuiteCounts {
        self.run_counts
    }

    /// Prepares the report directory and computes the rerun filters.
    ///
    /// The filters only narrow the run if the report directory already existed, i.e. if an
    /// earlier run is being resumed. They are computed once and never re-evaluated.
    pub fn init(&mut self) -> Result<RerunFilters, CoordinatorError> {
        self.expect_state("init", CoordinatorState::Init)?;

        let filters = match &self.tracker {
            Some(tracker) => {
                self.resuming = tracker.store.exists();
                tracker.store.create_root()?;
                if self.resuming {
                    info!(
                        root = %tracker.store.root(),
                        mode = %tracker.mode,
                        "resuming from an earlier run"
                    );
                    plan_filters(tracker.mode, &tracker.store)
                } else {
                    info!(root = %tracker.store.root(), "starting a fresh run");
                    RerunFilters::run_all()
                }
            }
            None => {
                debug!("no report directory or run mode configured, tracking disabled");
                RerunFilters::run_all()
            }
        };

        self.state = CoordinatorState::Ready;
        Ok(filters)
    }

    /// Starts a suite. The first suite of a run also begins the report.
    pub fn before_suite(&mut self, name: &str) -> Result<(), CoordinatorError> {
        self.expect_state("before_suite", CoordinatorState::Ready)?;

        if let Some(tracker) = &mut self.tracker {
            if !tracker.began {
                tracker.sink.begin_run(name)?;
                tracker.began = true;
            }
        }

        debug!(suite = name, "suite started");
        self.current_suite = Some(name.to_owned());
        self.suite_counts = SuiteCounts::default();
        self.state = CoordinatorState::Executing;
        Ok(())
    }

    /// Notes that a test started.
    pub fn before_test(&mut self, identity: &TestIdentity) -> Result<(), CoordinatorError> {
        self.expect_state("before_test", CoordinatorState::Executing)?;
        debug!(%identity, "test started");
        Ok(())
    }

    /// Records a finished test.
    ///
    /// The status marker and time file are written first. For failures, a link is then added to
    /// the report, and the raw and filtered diagnostics are written last.
    pub fn after_test(&mut self, finished: FinishedTest) -> Result<(), CoordinatorError> {
        self.expect_state("after_test", CoordinatorState::Executing)?;

        let FinishedTest {
            identity,
            result,
            duration,
            stack_trace,
            stdout,
            stderr,
        } = finished;
        self.suite_counts.add(result);
        self.run_counts.add(result);

        let Some(tracker) = &mut self.tracker else {
            return Ok(());
        };

        let status = result_to_status(result);
        tracker.store.write(&identity, status)?;
        tracker.store.write_time(&identity, duration)?;

        if status == StatusKind::Failure {
            tracker
                .sink
                .record_failure_link(&identity, &detail_url(&identity))?;
            let diagnostics =
                CapturedDiagnostics::capture(&self.stack_trace_filter, stack_trace, stdout, stderr);
            tracker.store.write_diagnostics(&identity, &diagnostics)?;
        }

        Ok(())
    }

    /// Finishes a suite and writes its summary to the report.
    ///
    /// If `counts` is `None`, the counts aggregated from `after_test` calls are used.
    pub fn after_suite(
        &mut self,
        name: &str,
        counts: Option<SuiteCounts>,
    ) -> Result<SuiteCounts, CoordinatorError> {
        self.expect_state("after_suite", CoordinatorState::Executing)?;

        let counts = counts.unwrap_or(self.suite_counts);
        if let Some(tracker) = &mut self.tracker {
            tracker.sink.finalize_module(name, &counts)?;
        }

        debug!(
            suite = name,
            total = counts.total,
            failed = counts.failed,
            "suite finished"
        );
        self.current_suite = None;
        self.state = CoordinatorState::Ready;
        Ok(counts)
    }

    /// Ends the run. No hooks may be called afterwards.
    pub fn finish(&mut self) -> Result<SuiteCounts, CoordinatorError> {
        self.expect_state("finish", CoordinatorState::Ready)?;
        self.state = CoordinatorState::Finalized;
        if let Some(tracker) = &mut self.tracker {
            if tracker.began {
                tracker.sink.finish_run()?;
            }
        }
        Ok(self.run_counts)
    }

    /// Dispatches an event reported by a test engine to the matching hook.
    pub fn handle_event(&mut self, event: EventSummary) -> Result<(), CoordinatorError> {
        match event {
            EventSummary::SuiteStarted { name } => self.before_suite(&name),
            EventSummary::TestStarted {
                class_name,
                test_name,
            } => self.before_test(&TestIdentity::new(class_name, test_name)?),
            EventSummary::TestFinished {
                class_name,
                test_name,
                result,
                duration_ms,
                stack_trace,
                stdout,
                stderr,
            } => self.after_test(FinishedTest {
                identity: TestIdentity::new(class_name, test_name)?,
                result,
                duration: Duration::from_millis(duration_ms.unwrap_or(0)),
                stack_trace,
                stdout,
                stderr,
            }),
            EventSummary::SuiteFinished { name, counts } => {
                self.after_suite(&name, counts).map(|_| ())
            }
            other => {
                debug!(?other, "ignoring unknown event");
                Ok(())
            }
        }
    }

    fn expect_state(
        &self,
        hook: &'static str,
        expected: CoordinatorState,
    ) -> Result<(), CoordinatorStateError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoordinatorStateError::new(hook, self.state))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_store::{FILTERED_EXCEPTIONS_FILE_NAME, RAW_EXCEPTIONS_FILE_NAME};
    use camino_tempfile::Utf8TempDir;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    fn id(class_name: &str, test_name: &str) -> TestIdentity {
        TestIdentity::new(class_name, test_name).unwrap()
    }

    fn finished(identity: TestIdentity, result: TestResultSummary) -> FinishedTest {
        FinishedTest {
            identity,
            result,
            duration: Duration::from_millis(1500),
            stack_trace: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn coordinator(dir: &Utf8TempDir, mode: RunMode) -> RunCoordinator {
        RunCoordinator::new(
            Some(TrackerSettings {
                report_dir: dir.path().join("report"),
                mode,
            }),
            Duration::from_secs(30),
            StackTraceFilter::new(["com.example"]),
        )
    }

    #[test]
    fn records_results() {
        let dir = camino_tempfile::tempdir().unwrap();
        let mut coordinator = coordinator(&dir, RunMode::Failing);

        let filters = coordinator.init().unwrap();
        assert!(filters.is_run_all(), "fresh run is not filtered");
        assert!(!coordinator.is_resuming());

        coordinator.before_suite("module").unwrap();
        coordinator.before_test(&id("A", "t1")).unwrap();
        coordinator
            .after_test(FinishedTest {
                stack_trace: Some(
                    "java.lang.AssertionError\n\tat com.example.A.t1(A.java:3)\n".to_owned(),
                ),
                stdout: "hello\n".to_owned(),
                ..finished(id("A", "t1"), TestResultSummary::Failure)
            })
            .unwrap();
        coordinator
            .after_test(finished(id("A", "t2"), TestResultSummary::Success))
            .unwrap();
        let counts = coordinator.after_suite("module", None).unwrap();
        assert_eq!(
            counts,
            SuiteCounts {
                total: 2,
                failed: 1,
                passed: 1,
                skipped: 0
            }
        );
        assert_eq!(coordinator.finish().unwrap(), counts);

        let store = coordinator.store().unwrap();
        assert_eq!(
            store.statuses(&id("A", "t1")).unwrap(),
            btreeset! {StatusKind::Failure, StatusKind::PastFailure}
        );
        assert_eq!(
            store.statuses(&id("A", "t2")).unwrap(),
            btreeset! {StatusKind::Success}
        );

        let t1_dir = store.test_dir(&id("A", "t1"));
        assert_eq!(
            std::fs::read_to_string(t1_dir.join(RAW_EXCEPTIONS_FILE_NAME)).unwrap(),
            "java.lang.AssertionError\n\tat com.example.A.t1(A.java:3)\n"
        );
        assert!(t1_dir.join(FILTERED_EXCEPTIONS_FILE_NAME).is_file());
        assert!(
            !store
                .test_dir(&id("A", "t2"))
                .join(RAW_EXCEPTIONS_FILE_NAME)
                .exists(),
            "passing tests have no diagnostics"
        );

        let report = std::fs::read_to_string(dir.path().join("report/index.html")).unwrap();
        assert!(report.contains("A/t1/exceptions-filtered.txt"), "{report}");
        assert!(!report.contains("A/t2/"), "{report}");
    }

    #[test]
    fn resumed_run_is_planned() {
        let dir = camino_tempfile::tempdir().unwrap();

        let mut first = coordinator(&dir, RunMode::Failing);
        first.init().unwrap();
        first.before_suite("module").unwrap();
        first
            .after_test(finished(id("A", "t1"), TestResultSummary::Failure))
            .unwrap();
        first
            .after_test(finished(id("A", "t2"), TestResultSummary::Success))
            .unwrap();
        first.after_suite("module", None).unwrap();
        first.finish().unwrap();

        let mut second = coordinator(&dir, RunMode::Failing);
        let filters = second.init().unwrap();
        assert!(second.is_resuming());
        assert!(filters.matches(&id("A", "t1")));
        assert!(!filters.matches(&id("A", "t2")));
        second.before_suite("module").unwrap();
        second
            .after_test(finished(id("A", "t1"), TestResultSummary::Success))
            .unwrap();
        second.after_suite("module", None).unwrap();
        second.finish().unwrap();

        let report = std::fs::read_to_string(dir.path().join("report/index.html")).unwrap();
        assert_eq!(report.matches("<h1>module</h1>").count(), 2);
        assert_eq!(
            report.matches("<ul>").count(),
            report.matches("</ul>").count(),
            "finished runs leave no list open: {report}"
        );
    }

    #[test]
    fn hooks_out_of_order() {
        let dir = camino_tempfile::tempdir().unwrap();
        let mut coordinator = coordinator(&dir, RunMode::All);

        let err = coordinator.before_suite("module").unwrap_err();
        match err {
            CoordinatorError::State(err) => {
                assert_eq!(err.hook(), "before_suite");
                assert_eq!(err.state(), CoordinatorState::Init);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        coordinator.init().unwrap();
        coordinator.init().unwrap_err();
        coordinator
            .after_test(finished(id("A", "t1"), TestResultSummary::Success))
            .unwrap_err();

        coordinator.before_suite("module").unwrap();
        coordinator.finish().unwrap_err();
        coordinator.after_suite("module", None).unwrap();
        coordinator.finish().unwrap();

        let err = coordinator
            .after_test(finished(id("A", "t1"), TestResultSummary::Success))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`after_test` called while the run coordinator is finalized"
        );
    }

    #[test]
    fn disabled_passes_through() {
        let mut coordinator =
            RunCoordinator::new(None, Duration::from_secs(30), StackTraceFilter::default());
        assert!(!coordinator.is_enabled());
        assert!(coordinator.init().unwrap().is_run_all());

        coordinator.before_suite("module").unwrap();
        coordinator
            .after_test(finished(id("A", "t1"), TestResultSummary::Failure))
            .unwrap();
        coordinator
            .after_test(finished(id("A", "t2"), TestResultSummary::Skipped))
            .unwrap();
        let counts = coordinator.after_suite("module", None).unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert!(coordinator.store().is_none());
    }

    #[test]
    fn events_drive_hooks() {
        let dir = camino_tempfile::tempdir().unwrap();
        let mut coordinator = coordinator(&dir, RunMode::All);
        coordinator.init().unwrap();

        let reported = SuiteCounts {
            total: 10,
            failed: 0,
            passed: 10,
            skipped: 0,
        };
        let events = [
            EventSummary::SuiteStarted {
                name: "module".to_owned(),
            },
            EventSummary::TestStarted {
                class_name: "A".to_owned(),
                test_name: "t1".to_owned(),
            },
            EventSummary::TestFinished {
                class_name: "A".to_owned(),
                test_name: "t1".to_owned(),
                result: TestResultSummary::Success,
                duration_ms: Some(20),
                stack_trace: None,
                stdout: String::new(),
                stderr: String::new(),
            },
            EventSummary::SuiteFinished {
                name: "module".to_owned(),
                counts: Some(reported),
            },
        ];
        for event in events {
            coordinator.handle_event(event).unwrap();
        }
        assert_eq!(coordinator.state(), CoordinatorState::Ready);
        assert_eq!(coordinator.run_counts().total, 1);

        let report = std::fs::read_to_string(dir.path().join("report/index.html")).unwrap();
        assert!(report.contains("10 tests, 0 failed, 10 passed, 0 skipped"), "{report}");

        let err = coordinator
            .handle_event(EventSummary::TestStarted {
                class_name: "A".to_owned(),
                test_name: "bad\nname".to_owned(),
            })
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidIdentity(_)), "{err:?}");
    }
}
