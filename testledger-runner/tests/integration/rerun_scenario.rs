// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use testledger_metadata::{SuiteCounts, TestResultSummary};
use testledger_runner::{
    coordinator::RunCoordinator,
    identity::TestIdentity,
    report::REPORT_FILE_NAME,
    rerun::plan_filters,
    run_mode::RunMode,
    status_store::{FILTERED_EXCEPTIONS_FILE_NAME, RAW_EXCEPTIONS_FILE_NAME, StatusKind},
    test_filter::MismatchReason,
    test_list::TestList,
};
use test_case::test_case;

fn all_tests() -> TestList {
    TestList::from_identities([id("A", "t1"), id("A", "t2"), id("B", "t1")])
}

fn names(identities: impl IntoIterator<Item = TestIdentity>) -> BTreeSet<String> {
    identities.into_iter().map(|i| i.to_string()).collect()
}

/// Runs the first pass of the scenario: `A.t1` and `B.t1` fail, `A.t2` passes.
fn first_run(workspace: &camino::Utf8Path) -> Result<()> {
    let config = load_config(workspace, RunMode::All)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let selected = select(&mut coordinator, &all_tests())?;
    assert!(!coordinator.is_resuming(), "first run is fresh");
    assert_eq!(selected.matched.len(), 3, "fresh run selects every test");

    let counts = record(
        &mut coordinator,
        &[
            (id("A", "t1"), TestResultSummary::Failure),
            (id("A", "t2"), TestResultSummary::Success),
            (id("B", "t1"), TestResultSummary::Failure),
        ],
    )?;
    assert_eq!(
        counts,
        SuiteCounts {
            total: 3,
            failed: 2,
            passed: 1,
            skipped: 0,
        }
    );
    Ok(())
}

#[test_case(RunMode::All, &["A.t1", "A.t2", "B.t1"] ; "all")]
#[test_case(RunMode::Outstanding, &["A.t1", "B.t1"] ; "outstanding")]
#[test_case(RunMode::Failing, &["A.t1", "B.t1"] ; "failing")]
#[test_case(RunMode::PastFailing, &["A.t1", "B.t1"] ; "past failing")]
fn resumed_selection(mode: RunMode, expected: &[&str]) -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;
    first_run(workspace.path())?;

    let config = load_config(workspace.path(), mode)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let selected = select(&mut coordinator, &all_tests())?;
    assert!(coordinator.is_resuming(), "second run resumes the first");

    assert_eq!(
        names(selected.matched),
        expected.iter().map(|s| (*s).to_owned()).collect::<BTreeSet<_>>()
    );
    assert_eq!(
        selected.skipped.len(),
        3 - expected.len(),
        "every other test is skipped by the rerun filter"
    );
    assert!(
        selected
            .skipped
            .iter()
            .all(|(_, reason)| *reason == MismatchReason::Rerun)
    );
    Ok(())
}

#[test]
fn past_failures_are_sticky() -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;
    first_run(workspace.path())?;

    // Second run: rerun the failing tests, and A.t1 now passes.
    let config = load_config(workspace.path(), RunMode::Failing)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let selected = select(&mut coordinator, &all_tests())?;
    assert_eq!(names(selected.matched), btreeset! {"A.t1".to_owned(), "B.t1".to_owned()});
    record(
        &mut coordinator,
        &[
            (id("A", "t1"), TestResultSummary::Success),
            (id("B", "t1"), TestResultSummary::Failure),
        ],
    )?;

    let store = coordinator.store().expect("tracking is enabled");
    assert_eq!(
        store.statuses(&id("A", "t1"))?,
        btreeset! {StatusKind::Success, StatusKind::PastFailure}
    );
    assert_eq!(
        plan_filters(RunMode::Failing, store).include_patterns(),
        vec!["B.t1".to_owned()]
    );

    // Third run: past failures still include A.t1.
    let config = load_config(workspace.path(), RunMode::PastFailing)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let selected = select(&mut coordinator, &all_tests())?;
    assert_eq!(names(selected.matched), btreeset! {"A.t1".to_owned(), "B.t1".to_owned()});

    let config = load_config(workspace.path(), RunMode::Outstanding)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let selected = select(&mut coordinator, &all_tests())?;
    assert_eq!(names(selected.matched), btreeset! {"B.t1".to_owned()});
    Ok(())
}

#[test]
fn failing_mode_with_no_failures_runs_nothing() -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;

    let config = load_config(workspace.path(), RunMode::All)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    select(&mut coordinator, &all_tests())?;
    record(
        &mut coordinator,
        &[
            (id("A", "t1"), TestResultSummary::Success),
            (id("A", "t2"), TestResultSummary::Skipped),
        ],
    )?;

    let config = load_config(workspace.path(), RunMode::Failing)?;
    let mut coordinator = RunCoordinator::from_config(&config);
    let selected = select(&mut coordinator, &all_tests())?;
    assert!(selected.matched.is_empty(), "no failures means no tests");
    assert_eq!(selected.skip_count(MismatchReason::Rerun), 3);
    Ok(())
}

#[test]
fn report_and_diagnostics_are_written() -> Result<()> {
    let workspace = camino_tempfile::tempdir()?;
    first_run(workspace.path())?;

    let report_dir = workspace.path().join("report");
    let html = std::fs::read_to_string(report_dir.join(REPORT_FILE_NAME))?;
    assert!(html.contains("<meta http-equiv=\"refresh\""), "auto-refresh: {html}");
    assert!(html.contains("A.t1"), "failure link for A.t1: {html}");
    assert!(html.contains("B.t1"), "failure link for B.t1: {html}");
    assert!(html.contains(SUITE_NAME), "module summary: {html}");

    let config = load_config(workspace.path(), RunMode::All)?;
    let coordinator = RunCoordinator::from_config(&config);
    let store = coordinator.store().expect("tracking is enabled");
    let test_dir = store.test_dir(&id("B", "t1"));
    let raw = std::fs::read_to_string(test_dir.join(RAW_EXCEPTIONS_FILE_NAME))?;
    assert!(raw.contains("java.lang.AssertionError"));
    assert!(test_dir.join(FILTERED_EXCEPTIONS_FILE_NAME).exists());

    let passing_dir = store.test_dir(&id("A", "t2"));
    assert!(!passing_dir.join(RAW_EXCEPTIONS_FILE_NAME).exists());
    Ok(())
}
