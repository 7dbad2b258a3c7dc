// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filtering tests based on rerun state, name patterns and partitions.

use crate::{
    errors::TestFilterBuilderError,
    identity::TestIdentity,
    partition::{Partitioner, PartitionerBuilder},
    rerun::RerunFilters,
};
use aho_corasick::AhoCorasick;
use std::fmt;

/// A set of substring patterns matched against `Class.test`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestFilterPatterns {
    patterns: Vec<String>,
    skip_patterns: Vec<String>,
}

impl TestFilterPatterns {
    /// Creates a new set of patterns. With no patterns, every test matches.
    pub fn new(substring_patterns: Vec<String>) -> Self {
        Self {
            patterns: substring_patterns,
            skip_patterns: Vec::new(),
        }
    }

    /// Adds a substring pattern.
    pub fn add_substring_pattern(&mut self, pattern: String) {
        self.patterns.push(pattern);
    }

    /// Adds a skip pattern. Skip patterns override all other patterns.
    pub fn add_skip_pattern(&mut self, pattern: String) {
        self.skip_patterns.push(pattern);
    }

    fn resolve(self) -> Result<ResolvedFilterPatterns, TestFilterBuilderError> {
        let Self {
            mut patterns,
            mut skip_patterns,
        } = self;
        // Sorting makes the PartialEq implementation order-independent.
        patterns.sort_unstable();
        skip_patterns.sort_unstable();

        let pattern_matcher = if patterns.is_empty() {
            None
        } else {
            Some(Box::new(AhoCorasick::new(&patterns)?))
        };
        let skip_pattern_matcher = if skip_patterns.is_empty() {
            None
        } else {
            Some(Box::new(AhoCorasick::new(&skip_patterns)?))
        };

        Ok(ResolvedFilterPatterns {
            patterns,
            skip_patterns,
            pattern_matcher,
            skip_pattern_matcher,
        })
    }
}

#[derive(Clone, Debug)]
struct ResolvedFilterPatterns {
    patterns: Vec<String>,
    skip_patterns: Vec<String>,
    pattern_matcher: Option<Box<AhoCorasick>>,
    skip_pattern_matcher: Option<Box<AhoCorasick>>,
}

impl ResolvedFilterPatterns {
    fn is_match(&self, name: &str) -> bool {
        // skip overrides all other patterns.
        if self
            .skip_pattern_matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(name))
        {
            return false;
        }
        match &self.pattern_matcher {
            Some(matcher) => matcher.is_match(name),
            None => true,
        }
    }
}

impl PartialEq for ResolvedFilterPatterns {
    fn eq(&self, other: &Self) -> bool {
        // The matchers are derived from the patterns.
        self.patterns == other.patterns && self.skip_patterns == other.skip_patterns
    }
}

impl Eq for ResolvedFilterPatterns {}

/// The reason a test was not selected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MismatchReason {
    /// The rerun filters computed from a previous run excluded it.
    Rerun,

    /// No name pattern matched it, or a skip pattern did.
    String,

    /// It belongs to a different shard.
    Partition,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rerun => write!(f, "not selected by the rerun filter"),
            Self::String => write!(f, "didn't match name patterns"),
            Self::Partition => write!(f, "in a different partition"),
        }
    }
}

/// Whether a test matched the filter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// The test will be run.
    Matches,

    /// The test will not be run.
    Mismatch {
        /// Why the test is not run.
        reason: MismatchReason,
    },
}

impl FilterMatch {
    /// Returns true if the test will be run.
    pub fn is_match(self) -> bool {
        matches!(self, Self::Matches)
    }
}

/// A builder for [`TestFilter`] instances.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestFilterBuilder {
    rerun: RerunFilters,
    patterns: ResolvedFilterPatterns,
    partitioner_builder: Option<PartitionerBuilder>,
}

impl TestFilterBuilder {
    /// Creates a new `TestFilterBuilder`.
    pub fn new(
        rerun: RerunFilters,
        patterns: TestFilterPatterns,
        partitioner_builder: Option<PartitionerBuilder>,
    ) -> Result<Self, TestFilterBuilderError> {
        Ok(Self {
            rerun,
            patterns: patterns.resolve()?,
            partitioner_builder,
        })
    }

    /// Creates a filter that selects every test.
    pub fn default_set() -> Self {
        Self {
            rerun: RerunFilters::run_all(),
            patterns: ResolvedFilterPatterns {
                patterns: Vec::new(),
                skip_patterns: Vec::new(),
                pattern_matcher: None,
                skip_pattern_matcher: None,
            },
            partitioner_builder: None,
        }
    }

    /// Returns the rerun filters.
    pub fn rerun(&self) -> &RerunFilters {
        &self.rerun
    }

    /// Creates a new filter. Filters are stateful when partitioning by count, so a fresh one is
    /// needed for each pass over the test list.
    pub fn build(&self) -> TestFilter<'_> {
        TestFilter {
            builder: self,
            partitioner: self.partitioner_builder.as_ref().map(|builder| builder.build()),
        }
    }
}

/// A test filter for one pass over a test list.
#[derive(Debug)]
pub struct TestFilter<'builder> {
    builder: &'builder TestFilterBuilder,
    partitioner: Option<Partitioner>,
}

impl TestFilter<'_> {
    /// Returns whether `identity` should be run.
    ///
    /// The rerun filter takes precedence, then name patterns, then the partition.
    pub fn filter_match(&mut self, identity: &TestIdentity) -> FilterMatch {
        let base = self.filter_match_base(identity);
        // The base filter still runs for tests the rerun filter rejects, so that count-based
        // shards stay the same across reruns.
        if !self.builder.rerun.matches(identity) {
            return FilterMatch::Mismatch {
                reason: MismatchReason::Rerun,
            };
        }
        base
    }

    fn filter_match_base(&mut self, identity: &TestIdentity) -> FilterMatch {
        if !self.builder.patterns.is_match(&identity.to_string()) {
            return FilterMatch::Mismatch {
                reason: MismatchReason::String,
            };
        }

        // Partitioning comes after name matching, so that count-based bucketing applies to the
        // tests that would otherwise run.
        let partition_match = match &mut self.partitioner {
            Some(partitioner) => partitioner.test_matches(identity),
            None => true,
        };
        if partition_match {
            FilterMatch::Matches
        } else {
            FilterMatch::Mismatch {
                reason: MismatchReason::Partition,
            }
        }
    }
}
