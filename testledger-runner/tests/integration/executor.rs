// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8PathBuf;
use color_eyre::eyre::Result;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use testledger_runner::{
    config::{TestThreads, TestledgerConfig},
    coordinator::RunCoordinator,
    identity::TestIdentity,
    reporter::{CancelReason, TestEvent, TestEventKind},
    run_mode::RunMode,
    runner::{RunStats, TestCommand, TestRunnerBuilder},
    status_store::{RAW_EXCEPTIONS_FILE_NAME, STDERR_FILE_NAME, STDOUT_FILE_NAME, StatusKind},
    test_list::TestList,
};
use testledger_metadata::TestResultSummary;

/// A test command that passes tests named `pass*`, skips tests named `skip*` and fails the rest.
fn shell_command() -> Result<TestCommand> {
    let script = r#"
        case "$TESTLEDGER_TEST" in
            pass*) echo "running {class}.{test}"; exit 0 ;;
            skip*) exit 77 ;;
            *)
                echo "output of {test}"
                echo "java.lang.AssertionError: {test} failed" >&2
                echo "	at com.example.{class}.{test}(Test.java:10)" >&2
                exit 1
                ;;
        esac
    "#;
    Ok(TestCommand::from_args(
        ["sh", "-c", script],
        vec![Utf8PathBuf::from("lib/a.jar")],
    )?)
}

fn execute(
    config: &TestledgerConfig,
    coordinator: &mut RunCoordinator,
    tests: &TestList,
    builder: TestRunnerBuilder,
) -> Result<(RunStats, Vec<TestEvent>)> {
    let selected = select(coordinator, tests)?;
    let runner = builder.build(
        SUITE_NAME,
        &selected.matched,
        selected.skipped.len(),
        shell_command()?,
        config,
    )?;
    let mut events = Vec::new();
    let stats = runner.execute(coordinator, |event| events.push(event))?;
    coordinator.finish()?;
    Ok((stats, events))
}

fn finished_results(events: &[TestEvent]) -> Vec<(TestIdentity, TestResultSummary)> {
    let mut results: Vec<_> = events
        .iter()
        .filter_map(|event| match &event.kind {
            TestEventKind::TestFinished {
                identity, status, ..
            } => Some((identity.clone(), status.result)),
            _ => None,
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

#[test]
fn runs_and_records_processes() -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;
    let tests = TestList::from_identities([
        id("A", "pass1"),
        id("A", "fail1"),
        id("B", "skip1"),
        id("B", "pass2"),
    ]);

    let config = load_config(workspace.path(), RunMode::Failing)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let mut builder = TestRunnerBuilder::default();
    builder.set_test_threads(TestThreads::Count(2));
    let (stats, events) = execute(&config, &mut coordinator, &tests, builder)?;

    assert_eq!(
        stats,
        RunStats {
            initial_run_count: 4,
            finished_count: 4,
            passed: 2,
            failed: 1,
            skipped: 1,
        }
    );
    assert!(matches!(
        events.first().map(|event| &event.kind),
        Some(TestEventKind::RunStarted {
            run_count: 4,
            filtered_out: 0,
            test_threads: 2,
            resuming: false,
        })
    ));
    assert!(matches!(
        events.last().map(|event| &event.kind),
        Some(TestEventKind::RunFinished { .. })
    ));
    assert_eq!(
        finished_results(&events),
        vec![
            (id("A", "fail1"), TestResultSummary::Failure),
            (id("A", "pass1"), TestResultSummary::Success),
            (id("B", "pass2"), TestResultSummary::Success),
            (id("B", "skip1"), TestResultSummary::Skipped),
        ]
    );

    let store = coordinator.store().expect("tracking is enabled");
    assert_eq!(
        store.statuses(&id("A", "fail1"))?,
        btreeset! {StatusKind::Failure, StatusKind::PastFailure}
    );
    assert_eq!(
        store.statuses(&id("B", "skip1"))?,
        btreeset! {StatusKind::Success}
    );

    let fail_dir = store.test_dir(&id("A", "fail1"));
    assert_eq!(
        std::fs::read_to_string(fail_dir.join(RAW_EXCEPTIONS_FILE_NAME))?,
        "java.lang.AssertionError: fail1 failed\n\tat com.example.A.fail1(Test.java:10)\n"
    );
    assert_eq!(
        std::fs::read_to_string(fail_dir.join(STDOUT_FILE_NAME))?,
        "output of fail1\n"
    );
    assert!(fail_dir.join(STDERR_FILE_NAME).exists());

    // The second run only reruns the failing test.
    let mut coordinator = RunCoordinator::from_config(&config);
    let (stats, events) = execute(
        &config,
        &mut coordinator,
        &tests,
        TestRunnerBuilder::default(),
    )?;
    assert_eq!(stats.finished_count, 1);
    assert_eq!(stats.failed, 1);
    assert!(matches!(
        events.first().map(|event| &event.kind),
        Some(TestEventKind::RunStarted {
            run_count: 1,
            filtered_out: 3,
            resuming: true,
            ..
        })
    ));
    Ok(())
}

#[test]
fn fail_fast_stops_scheduling() -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;
    let tests = TestList::from_identities([id("A", "fail1"), id("A", "pass1"), id("A", "pass2")]);

    let config = load_config(workspace.path(), RunMode::All)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_test_threads(TestThreads::Count(1))
        .set_fail_fast(true);
    let (stats, events) = execute(&config, &mut coordinator, &tests, builder)?;

    assert_eq!(stats.initial_run_count, 3);
    assert_eq!(stats.finished_count, 1);
    assert_eq!(stats.failed, 1);
    assert!(events.iter().any(|event| matches!(
        event.kind,
        TestEventKind::RunBeginCancel {
            reason: CancelReason::TestFailure,
            ..
        }
    )));

    // Tests that never started are not recorded.
    let store = coordinator.store().expect("tracking is enabled");
    assert!(store.statuses(&id("A", "pass1"))?.is_empty());
    Ok(())
}

#[test]
fn timestamp_file_is_touched() -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;
    let timestamp_file = workspace.path().join("last_test_time");
    let tests = TestList::from_identities([id("A", "pass1")]);

    let config = load_config(workspace.path(), RunMode::All)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let mut builder = TestRunnerBuilder::default();
    builder.set_timestamp_file(timestamp_file.clone());
    let (stats, _) = execute(&config, &mut coordinator, &tests, builder)?;

    assert_eq!(stats.passed, 1);
    let contents = std::fs::read_to_string(&timestamp_file)?;
    assert!(
        chrono::DateTime::parse_from_rfc3339(contents.trim()).is_ok(),
        "timestamp file holds an RFC 3339 time: {contents:?}"
    );
    Ok(())
}
