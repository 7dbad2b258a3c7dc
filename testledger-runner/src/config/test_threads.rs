// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{config::get_num_cpus, errors::TestThreadsParseError};
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Type for the test-threads config key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run tests with a specified number of threads.
    Count(usize),

    /// Run tests with a number of threads equal to the logical CPU count.
    NumCpus,
}

impl TestThreads {
    /// Gets the actual number of test threads computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads,
            Self::NumCpus => get_num_cpus(),
        }
    }

    /// Computes the number of test threads when nothing was configured.
    ///
    /// Machines with at least `large_machine_threshold` logical CPUs use half of them.
    pub fn default_for(num_cpus: usize, large_machine_threshold: usize) -> usize {
        if num_cpus >= large_machine_threshold {
            (num_cpus / 2).max(1)
        } else {
            num_cpus.max(1)
        }
    }

    fn from_offset(offset: i64) -> Self {
        Self::Count((get_num_cpus() as i64 + offset).max(1) as usize)
    }
}

impl FromStr for TestThreads {
    type Err = TestThreadsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<i64>() {
            Err(_) | Ok(0) => Err(TestThreadsParseError::new(s)),
            Ok(j) if j < 0 => Ok(Self::from_offset(j)),
            Ok(j) => Ok(Self::Count(j as usize)),
        }
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                // Values from the environment arrive as strings.
                v.parse().map_err(|_| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Str(v), &self)
                })
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(TestThreads::Count(v as usize)),
                    Ordering::Less => Ok(TestThreads::from_offset(v)),
                    Ordering::Equal => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                    v => Ok(TestThreads::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("4", Some(TestThreads::Count(4)) ; "positive")]
    #[test_case("num-cpus", Some(TestThreads::NumCpus) ; "num cpus")]
    #[test_case("0", None ; "zero")]
    #[test_case("many", None ; "garbage")]
    fn parse_test_threads(input: &str, expected: Option<TestThreads>) {
        assert_eq!(input.parse::<TestThreads>().ok(), expected);
    }

    #[test]
    fn negative_is_offset() {
        let threads: TestThreads = "-1".parse().unwrap();
        assert_eq!(threads.compute(), get_num_cpus().saturating_sub(1).max(1));

        let threads: TestThreads = "-100000".parse().unwrap();
        assert_eq!(threads.compute(), 1);
    }

    #[test_case(8, 64, 8 ; "small machine")]
    #[test_case(63, 64, 63 ; "just below threshold")]
    #[test_case(64, 64, 32 ; "at threshold")]
    #[test_case(96, 64, 48 ; "large machine")]
    #[test_case(1, 1, 1 ; "never zero")]
    fn default_threads(num_cpus: usize, threshold: usize, expected: usize) {
        assert_eq!(TestThreads::default_for(num_cpus, threshold), expected);
    }
}
