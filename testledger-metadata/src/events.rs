// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::EventParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, io::BufRead};

/// A lifecycle event reported by a test engine.
///
/// Events are exchanged as JSON lines: one serialized `EventSummary` per line. A well-formed
/// stream starts with [`SuiteStarted`](Self::SuiteStarted), contains any number of test events,
/// and ends with [`SuiteFinished`](Self::SuiteFinished). Several suites (modules) may follow each
/// other in the same stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
#[non_exhaustive]
pub enum EventSummary {
    /// A suite (module) started.
    SuiteStarted {
        /// The name of the suite.
        name: String,
    },

    /// A test started.
    TestStarted {
        /// The class the test belongs to.
        class_name: String,

        /// The name of the test within its class.
        test_name: String,
    },

    /// A test finished.
    TestFinished {
        /// The class the test belongs to.
        class_name: String,

        /// The name of the test within its class.
        test_name: String,

        /// The result of the test.
        result: TestResultSummary,

        /// How long the test took, in milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,

        /// The stack trace of the exception that failed the test, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack_trace: Option<String>,

        /// Captured standard output.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        stdout: String,

        /// Captured standard error.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        stderr: String,
    },

    /// A suite (module) finished.
    SuiteFinished {
        /// The name of the suite.
        name: String,

        /// Counts reported by the engine. If absent, counts are aggregated from the test events
        /// seen for this suite.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counts: Option<SuiteCounts>,
    },
}

impl EventSummary {
    /// Parses a single JSON line.
    pub fn parse_line(line_number: usize, line: &str) -> Result<Self, EventParseError> {
        serde_json::from_str(line).map_err(|error| EventParseError::Json { line_number, error })
    }

    /// Returns an iterator over the events in a JSON-lines stream.
    ///
    /// Blank lines are skipped. Line numbers in errors are 1-based.
    pub fn parse_stream<R: BufRead>(
        reader: R,
    ) -> impl Iterator<Item = Result<Self, EventParseError>> {
        reader
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(Self::parse_line(idx + 1, &line)),
                Err(error) => Some(Err(EventParseError::Read {
                    line_number: idx + 1,
                    error,
                })),
            })
    }
}

/// The result of a single test, as reported by a test engine.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestResultSummary {
    /// The test passed.
    Success,
    /// The test failed.
    Failure,
    /// The test was skipped.
    Skipped,
}

impl TestResultSummary {
    /// All known results, in declaration order.
    pub const ALL: [Self; 3] = [Self::Success, Self::Failure, Self::Skipped];
}

#[cfg(feature = "proptest1")]
impl proptest::arbitrary::Arbitrary for TestResultSummary {
    type Parameters = ();
    type Strategy = proptest::sample::Select<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        proptest::sample::select(Self::ALL.to_vec())
    }
}

impl fmt::Display for TestResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Aggregate counts for a suite (module).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuiteCounts {
    /// The total number of tests that finished.
    pub total: usize,
    /// The number of tests that failed.
    pub failed: usize,
    /// The number of tests that passed.
    pub passed: usize,
    /// The number of tests that were skipped.
    pub skipped: usize,
}

impl SuiteCounts {
    /// Adds a single result to the counts.
    pub fn add(&mut self, result: TestResultSummary) {
        self.total += 1;
        match result {
            TestResultSummary::Success => self.passed += 1,
            TestResultSummary::Failure => self.failed += 1,
            TestResultSummary::Skipped => self.skipped += 1,
        }
    }

    /// Returns true if no tests finished.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
