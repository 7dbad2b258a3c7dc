// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run mode for testledger.

use crate::errors::RunModeParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Which tests to run when resuming from a previous run's status records.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum RunMode {
    /// Ignore history and run everything.
    #[default]
    All,

    /// Run everything not already marked `SUCCESS`.
    Outstanding,

    /// Run only tests currently marked `FAILURE`.
    Failing,

    /// Run only tests that have ever been marked `FAILURE`.
    PastFailing,
}

impl RunMode {
    /// Returns the string representations of all known variants.
    pub fn variants() -> [&'static str; 4] {
        ["all", "outstanding", "failing", "past-failing"]
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Outstanding => write!(f, "outstanding"),
            Self::Failing => write!(f, "failing"),
            Self::PastFailing => write!(f, "past-failing"),
        }
    }
}

impl FromStr for RunMode {
    type Err = RunModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s {
            "all" => Self::All,
            "outstanding" => Self::Outstanding,
            "failing" => Self::Failing,
            "past-failing" => Self::PastFailing,
            other => return Err(RunModeParseError::new(other)),
        };
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[proptest]
    fn display_parses_back(mode: RunMode) {
        assert_eq!(mode.to_string().parse::<RunMode>().unwrap(), mode);
        assert!(RunMode::variants().contains(&mode.to_string().as_str()));
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "past_failing".parse::<RunMode>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unrecognized value for run mode: past_failing\n\
             (known values: all, outstanding, failing, past-failing)"
        );
    }
}
