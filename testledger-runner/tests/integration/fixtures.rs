// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use color_eyre::eyre::Result;
use testledger_metadata::{SuiteCounts, TestResultSummary};
use testledger_runner::{
    config::{DefaultConfigWarnings, EnvOverrides, TestledgerConfig},
    coordinator::{FinishedTest, RunCoordinator},
    identity::TestIdentity,
    run_mode::RunMode,
    test_filter::{TestFilterBuilder, TestFilterPatterns},
    test_list::{FilteredTestList, TestList},
};
use std::time::Duration;

pub(crate) const SUITE_NAME: &str = "integration";

pub(crate) fn id(class_name: &str, test_name: &str) -> TestIdentity {
    TestIdentity::new(class_name, test_name).expect("valid identity")
}

/// Loads the default config for `workspace_root`, with the report directory at `report` and the
/// given mode.
pub(crate) fn load_config(workspace_root: &Utf8Path, mode: RunMode) -> Result<TestledgerConfig> {
    let env = EnvOverrides {
        report_dir: Some("report".to_owned()),
        mode: Some(mode.to_string()),
    };
    let config =
        TestledgerConfig::from_sources(workspace_root, None, &env, &mut DefaultConfigWarnings)?;
    Ok(config)
}

/// Initializes the coordinator and applies the rerun filters to `tests`.
pub(crate) fn select(coordinator: &mut RunCoordinator, tests: &TestList) -> Result<FilteredTestList> {
    let filters = coordinator.init()?;
    let builder = TestFilterBuilder::new(filters, TestFilterPatterns::default(), None)?;
    Ok(tests.filter(&builder))
}

/// Records `results` as one suite and finishes the run.
pub(crate) fn record(
    coordinator: &mut RunCoordinator,
    results: &[(TestIdentity, TestResultSummary)],
) -> Result<SuiteCounts> {
    coordinator.before_suite(SUITE_NAME)?;
    for (identity, result) in results {
        coordinator.before_test(identity)?;
        coordinator.after_test(FinishedTest {
            identity: identity.clone(),
            result: *result,
            duration: Duration::from_millis(20),
            stack_trace: (*result == TestResultSummary::Failure).then(|| {
                format!(
                    "java.lang.AssertionError\n\tat com.example.{}.{}(Test.java:10)\n",
                    identity.class_name(),
                    identity.test_name()
                )
            }),
            stdout: String::new(),
            stderr: String::new(),
        })?;
    }
    coordinator.after_suite(SUITE_NAME, None)?;
    Ok(coordinator.finish()?)
}
