// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rerun planning.
//!
//! Before any test runs, the status records of the previous run are turned into include and
//! exclude filters according to the [`RunMode`]. The result is a snapshot: it is never
//! recomputed while tests execute.

use crate::{
    identity::TestIdentity,
    run_mode::RunMode,
    status_store::{StatusKind, StatusStore},
};
use std::{collections::BTreeSet, fmt};
use tracing::info;

/// The pattern emitted when a rerun should select nothing.
///
/// An empty include list means "no filter" to most runners, so an explicit pattern that can't
/// name a real test is used instead. It contains a newline-free name no engine produces, and
/// [`RerunFilters::matches`] rejects every identity when it is present.
pub const NO_MATCH_PATTERN: &str = "testledger.NoTestsSelected.__no_test__";

/// Source of status records used for planning.
///
/// Implemented by [`StatusStore`], and by simple in-memory models in tests.
pub trait StatusSource {
    /// Returns every identity carrying a `kind` marker.
    fn identities_with(&self, kind: StatusKind) -> Box<dyn Iterator<Item = TestIdentity> + '_>;
}

impl StatusSource for StatusStore {
    fn identities_with(&self, kind: StatusKind) -> Box<dyn Iterator<Item = TestIdentity> + '_> {
        Box::new(self.scan(kind))
    }
}

/// A single include pattern.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum IncludePattern {
    /// Select this test.
    Identity(TestIdentity),

    /// Select nothing. See [`NO_MATCH_PATTERN`].
    NoMatch,
}

impl fmt::Display for IncludePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(identity) => write!(f, "{identity}"),
            Self::NoMatch => f.write_str(NO_MATCH_PATTERN),
        }
    }
}

/// Include and exclude filters computed from a previous run.
///
/// With no include patterns every test not excluded is selected. With include patterns, only
/// the tests they name are selected.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RerunFilters {
    include: BTreeSet<IncludePattern>,
    exclude: BTreeSet<TestIdentity>,
}

impl RerunFilters {
    /// Returns filters that select every test.
    pub fn run_all() -> Self {
        Self::default()
    }

    /// Returns the include patterns.
    pub fn include(&self) -> &BTreeSet<IncludePattern> {
        &self.include
    }

    /// Returns the excluded identities.
    pub fn exclude(&self) -> &BTreeSet<TestIdentity> {
        &self.exclude
    }

    /// Returns true if these filters select every test.
    pub fn is_run_all(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Returns true if these filters select nothing at all.
    pub fn matches_nothing(&self) -> bool {
        self.include.contains(&IncludePattern::NoMatch)
    }

    /// Returns true if `identity` is selected.
    pub fn matches(&self, identity: &TestIdentity) -> bool {
        if self.exclude.contains(identity) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        // The no-match pattern never equals an identity, so it can't select anything.
        self.include
            .contains(&IncludePattern::Identity(identity.clone()))
    }

    /// Renders the include patterns in `Class.test` form, including the no-match pattern.
    pub fn include_patterns(&self) -> Vec<String> {
        self.include.iter().map(|pattern| pattern.to_string()).collect()
    }

    /// Renders the exclude patterns in `Class.test` form.
    pub fn exclude_patterns(&self) -> Vec<String> {
        self.exclude.iter().map(|identity| identity.to_string()).collect()
    }

    /// Renders these filters as arguments for an external test engine: `--include <pattern>` and
    /// `--exclude <pattern>` pairs.
    pub fn to_runner_args(&self) -> Vec<String> {
        let include = self
            .include_patterns()
            .into_iter()
            .flat_map(|pattern| ["--include".to_owned(), pattern]);
        let exclude = self
            .exclude_patterns()
            .into_iter()
            .flat_map(|pattern| ["--exclude".to_owned(), pattern]);
        include.chain(exclude).collect()
    }
}

/// Computes the rerun filters for `mode` from the records in `source`.
pub fn plan_filters(mode: RunMode, source: &impl StatusSource) -> RerunFilters {
    let filters = match mode {
        RunMode::All => RerunFilters::run_all(),
        RunMode::Outstanding => RerunFilters {
            include: BTreeSet::new(),
            exclude: source.identities_with(StatusKind::Success).collect(),
        },
        RunMode::Failing => include_only(source, StatusKind::Failure),
        RunMode::PastFailing => include_only(source, StatusKind::PastFailure),
    };

    if filters.matches_nothing() {
        info!("run mode `{mode}`: no tests recorded as needing a rerun");
    } else {
        info!(
            "run mode `{mode}`: {} included, {} excluded",
            filters.include.len(),
            filters.exclude.len(),
        );
    }

    filters
}

fn include_only(source: &impl StatusSource, kind: StatusKind) -> RerunFilters {
    let mut include: BTreeSet<_> = source
        .identities_with(kind)
        .map(IncludePattern::Identity)
        .collect();
    if include.is_empty() {
        include.insert(IncludePattern::NoMatch);
    }
    RerunFilters {
        include,
        exclude: BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use test_strategy::proptest;

    /// An in-memory stand-in for the status store.
    #[derive(Clone, Debug, Default)]
    struct ModelStore {
        markers: BTreeMap<TestIdentity, BTreeSet<StatusKind>>,
    }

    impl StatusSource for ModelStore {
        fn identities_with(
            &self,
            kind: StatusKind,
        ) -> Box<dyn Iterator<Item = TestIdentity> + '_> {
            Box::new(
                self.markers
                    .iter()
                    .filter(move |(_, kinds)| kinds.contains(&kind))
                    .map(|(identity, _)| identity.clone()),
            )
        }
    }

    fn id(class_name: &str, test_name: &str) -> TestIdentity {
        TestIdentity::new(class_name, test_name).unwrap()
    }

    fn arb_identity() -> impl Strategy<Value = TestIdentity> {
        ("[A-C]", "t[1-3]").prop_map(|(class_name, test_name)| id(&class_name, &test_name))
    }

    fn arb_model() -> impl Strategy<Value = ModelStore> {
        proptest::collection::btree_map(
            arb_identity(),
            proptest::sample::subsequence(StatusKind::ALL.to_vec(), 0..=3)
                .prop_map(|kinds| kinds.into_iter().collect::<BTreeSet<_>>()),
            0..6,
        )
        .prop_map(|markers| ModelStore { markers })
    }

    #[proptest(cases = 64)]
    fn all_is_always_empty(#[strategy(arb_model())] model: ModelStore) {
        let filters = plan_filters(RunMode::All, &model);
        assert!(filters.include().is_empty());
        assert!(filters.exclude().is_empty());
        assert!(filters.is_run_all());
    }

    #[proptest(cases = 128)]
    fn plan_matches_oracle(
        #[strategy(arb_model())] model: ModelStore,
        mode: RunMode,
        #[strategy(arb_identity())] candidate: TestIdentity,
    ) {
        let filters = plan_filters(mode, &model);
        let kinds = model.markers.get(&candidate).cloned().unwrap_or_default();
        let expected = match mode {
            RunMode::All => true,
            RunMode::Outstanding => !kinds.contains(&StatusKind::Success),
            RunMode::Failing => kinds.contains(&StatusKind::Failure),
            RunMode::PastFailing => kinds.contains(&StatusKind::PastFailure),
        };
        assert_eq!(filters.matches(&candidate), expected);
    }

    #[test]
    fn failing_with_no_failures_matches_nothing() {
        let model = ModelStore {
            markers: [(id("A", "t2"), btreeset! {StatusKind::Success})]
                .into_iter()
                .collect(),
        };

        for mode in [RunMode::Failing, RunMode::PastFailing] {
            let filters = plan_filters(mode, &model);
            assert!(filters.matches_nothing());
            assert!(!filters.is_run_all());
            assert!(!filters.matches(&id("A", "t2")));
            assert!(!filters.matches(&id("com.example.Probe", "notInStore")));
            assert_eq!(filters.include_patterns(), vec![NO_MATCH_PATTERN.to_owned()]);
        }
    }

    #[test]
    fn runner_args() {
        let model = ModelStore {
            markers: [
                (id("A", "t1"), btreeset! {StatusKind::Failure, StatusKind::PastFailure}),
                (id("A", "t2"), btreeset! {StatusKind::Success}),
            ]
            .into_iter()
            .collect(),
        };

        assert_eq!(
            plan_filters(RunMode::Failing, &model).to_runner_args(),
            vec!["--include", "A.t1"],
        );
        assert_eq!(
            plan_filters(RunMode::Outstanding, &model).to_runner_args(),
            vec!["--exclude", "A.t2"],
        );
        assert_eq!(
            plan_filters(RunMode::All, &model).to_runner_args(),
            Vec::<String>::new(),
        );
    }
}
