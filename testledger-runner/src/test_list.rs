// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The list of tests a run knows about.
//!
//! A test list file has one test per line, `<class-name> <test-name>`. Blank lines and lines
//! starting with `#` are ignored.

use crate::{
    errors::TestListParseError,
    identity::TestIdentity,
    test_filter::{FilterMatch, MismatchReason, TestFilterBuilder},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;

/// An ordered list of unique tests.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestList {
    tests: Vec<TestIdentity>,
}

impl TestList {
    /// Reads a test list from a file.
    pub fn from_path(path: &Utf8Path) -> Result<Self, TestListParseError> {
        let contents = std::fs::read_to_string(path).map_err(|error| TestListParseError::Read {
            path: path.to_owned(),
            error,
        })?;
        Self::parse(path, &contents)
    }

    /// Parses a test list. `path` is only used for error messages.
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<Self, TestListParseError> {
        let mut tests = Vec::new();
        let mut first_seen: HashMap<TestIdentity, usize> = HashMap::new();

        for (idx, line) in contents.lines().enumerate() {
            let line_number = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((class_name, test_name)) = trimmed.split_once(is_separator) else {
                return Err(malformed(path, line_number, line));
            };
            let test_name = test_name.trim_start_matches(is_separator);
            if test_name.contains(is_separator) {
                return Err(malformed(path, line_number, line));
            }

            let identity = TestIdentity::new(class_name, test_name).map_err(|error| {
                TestListParseError::InvalidIdentity {
                    path: path.to_owned(),
                    line_number,
                    error,
                }
            })?;

            if let Some(&first_line) = first_seen.get(&identity) {
                return Err(TestListParseError::Duplicate {
                    path: path.to_owned(),
                    line_number,
                    first_line,
                    identity: identity.to_string(),
                });
            }
            first_seen.insert(identity.clone(), line_number);
            tests.push(identity);
        }

        Ok(Self { tests })
    }

    /// Creates a test list from identities, dropping later duplicates.
    pub fn from_identities(identities: impl IntoIterator<Item = TestIdentity>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let tests = identities
            .into_iter()
            .filter(|identity| seen.insert(identity.clone()))
            .collect();
        Self { tests }
    }

    /// Returns the number of tests in the list.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterates over tests in list order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TestIdentity> + '_ {
        self.tests.iter()
    }

    /// Applies a filter to the list, in list order.
    pub fn filter(&self, builder: &TestFilterBuilder) -> FilteredTestList {
        let mut filter = builder.build();
        let mut matched = Vec::new();
        let mut skipped = Vec::new();
        for identity in &self.tests {
            match filter.filter_match(identity) {
                FilterMatch::Matches => matched.push(identity.clone()),
                FilterMatch::Mismatch { reason } => skipped.push((identity.clone(), reason)),
            }
        }
        FilteredTestList { matched, skipped }
    }
}

fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn malformed(path: &Utf8Path, line_number: usize, line: &str) -> TestListParseError {
    TestListParseError::MalformedLine {
        path: Utf8PathBuf::from(path),
        line_number,
        line: line.to_owned(),
    }
}

/// The result of filtering a [`TestList`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FilteredTestList {
    /// Tests that will be run, in list order.
    pub matched: Vec<TestIdentity>,

    /// Tests that will not be run, with the reason.
    pub skipped: Vec<(TestIdentity, MismatchReason)>,
}

impl FilteredTestList {
    /// Returns the number of tests skipped for `reason`.
    pub fn skip_count(&self, reason: MismatchReason) -> usize {
        self.skipped.iter().filter(|(_, r)| *r == reason).count()
    }
}
