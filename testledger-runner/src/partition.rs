// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selecting a shard of the test list.
//!
//! Count-based sharding deals tests out round-robin in list order. Hash-based sharding is
//! stateless: a test always lands in the same shard for a given shard count, regardless of which
//! other tests are listed.

use crate::{errors::PartitionerBuilderParseError, identity::TestIdentity};
use std::{fmt, str::FromStr};
use xxhash_rust::xxh64::xxh64;

/// A builder for creating [`Partitioner`] instances.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PartitionerBuilder {
    /// Partition based on counting test numbers.
    Count {
        /// The shard this is in, counting up from 1.
        shard: u64,

        /// The total number of shards.
        total_shards: u64,
    },

    /// Partition based on hashing. Individual partitions are stateless.
    Hash {
        /// The shard this is in, counting up from 1.
        shard: u64,

        /// The total number of shards.
        total_shards: u64,
    },
}

impl PartitionerBuilder {
    /// Creates a new `Partitioner` from this `PartitionerBuilder`.
    pub fn build(&self) -> Partitioner {
        match *self {
            Self::Count {
                shard,
                total_shards,
            } => Partitioner::Count {
                shard_minus_one: shard - 1,
                total_shards,
                curr: 0,
            },
            Self::Hash {
                shard,
                total_shards,
            } => Partitioner::Hash {
                shard_minus_one: shard - 1,
                total_shards,
            },
        }
    }
}

impl fmt::Display for PartitionerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count {
                shard,
                total_shards,
            } => write!(f, "count:{shard}/{total_shards}"),
            Self::Hash {
                shard,
                total_shards,
            } => write!(f, "hash:{shard}/{total_shards}"),
        }
    }
}

impl FromStr for PartitionerBuilder {
    type Err = PartitionerBuilderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The input looks like "hash:<shard>/<total_shards>".
        if let Some(input) = s.strip_prefix("hash:") {
            let (shard, total_shards) = parse_shards(input, "hash:M/N")?;
            Ok(Self::Hash {
                shard,
                total_shards,
            })
        } else if let Some(input) = s.strip_prefix("count:") {
            let (shard, total_shards) = parse_shards(input, "count:M/N")?;
            Ok(Self::Count {
                shard,
                total_shards,
            })
        } else {
            Err(PartitionerBuilderParseError::new(
                None,
                format!("partition input '{s}' must begin with \"hash:\" or \"count:\""),
            ))
        }
    }
}

fn parse_shards(
    input: &str,
    expected_format: &'static str,
) -> Result<(u64, u64), PartitionerBuilderParseError> {
    let Some((shard_str, total_shards_str)) = input.split_once('/') else {
        return Err(PartitionerBuilderParseError::new(
            Some(expected_format),
            format!("expected input '{input}' to be in the format M/N"),
        ));
    };

    let shard: u64 = shard_str.parse().map_err(|err| {
        PartitionerBuilderParseError::new(
            Some(expected_format),
            format!("failed to parse shard '{shard_str}' as u64: {err}"),
        )
    })?;

    let total_shards: u64 = total_shards_str.parse().map_err(|err| {
        PartitionerBuilderParseError::new(
            Some(expected_format),
            format!("failed to parse total_shards '{total_shards_str}' as u64: {err}"),
        )
    })?;

    // Check that shard > 0 and <= total_shards.
    if !(1..=total_shards).contains(&shard) {
        return Err(PartitionerBuilderParseError::new(
            Some(expected_format),
            format!(
                "shard {shard} must be a number between 1 and total shards {total_shards}, inclusive"
            ),
        ));
    }

    Ok((shard, total_shards))
}

/// Decides, test by test, whether a test belongs to the selected shard.
#[derive(Clone, Debug)]
pub enum Partitioner {
    /// See [`PartitionerBuilder::Count`].
    Count {
        /// The zero-based shard.
        shard_minus_one: u64,
        /// The total number of shards.
        total_shards: u64,
        /// The position of the next test, modulo the shard count.
        curr: u64,
    },

    /// See [`PartitionerBuilder::Hash`].
    Hash {
        /// The zero-based shard.
        shard_minus_one: u64,
        /// The total number of shards.
        total_shards: u64,
    },
}

impl Partitioner {
    /// Returns true if `identity` belongs to this shard.
    ///
    /// For count-based partitioning, this must be called once per test, in list order.
    pub fn test_matches(&mut self, identity: &TestIdentity) -> bool {
        match self {
            Self::Count {
                shard_minus_one,
                total_shards,
                curr,
            } => {
                let matches = *curr == *shard_minus_one;
                *curr = (*curr + 1) % *total_shards;
                matches
            }
            Self::Hash {
                shard_minus_one,
                total_shards,
            } => {
                xxh64(identity.to_string().as_bytes(), 0) % *total_shards == *shard_minus_one
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ids(n: usize) -> Vec<TestIdentity> {
        (0..n)
            .map(|i| TestIdentity::new("com.example.FooTest", format!("test{i}")).unwrap())
            .collect()
    }

    #[test_case("hash:1/2", PartitionerBuilder::Hash { shard: 1, total_shards: 2 } ; "hash")]
    #[test_case("hash:1/1", PartitionerBuilder::Hash { shard: 1, total_shards: 1 } ; "hash single")]
    #[test_case("count:99/200", PartitionerBuilder::Count { shard: 99, total_shards: 200 } ; "count")]
    fn parse_success(input: &str, expected: PartitionerBuilder) {
        let builder: PartitionerBuilder = input.parse().unwrap();
        assert_eq!(builder, expected);
        assert_eq!(builder.to_string(), input);
    }

    #[test_case("foo" ; "no prefix")]
    #[test_case("hash" ; "bare hash")]
    #[test_case("hash:" ; "empty")]
    #[test_case("hash:1" ; "no total")]
    #[test_case("hash:1/" ; "empty total")]
    #[test_case("hash:0/2" ; "zero shard")]
    #[test_case("hash:3/2" ; "shard too large")]
    #[test_case("count:m/2" ; "bad shard")]
    #[test_case("count:1/n" ; "bad total")]
    #[test_case("count:1/2/3" ; "extra")]
    fn parse_failure(input: &str) {
        input
            .parse::<PartitionerBuilder>()
            .expect_err("input should fail to parse");
    }

    #[test]
    fn shards_are_disjoint_and_complete() {
        let ids = ids(25);
        for builder_fn in [
            (|shard| PartitionerBuilder::Count {
                shard,
                total_shards: 3,
            }) as fn(u64) -> PartitionerBuilder,
            |shard| PartitionerBuilder::Hash {
                shard,
                total_shards: 3,
            },
        ] {
            let mut seen = vec![0; ids.len()];
            for shard in 1..=3 {
                let mut partitioner = builder_fn(shard).build();
                for (idx, id) in ids.iter().enumerate() {
                    if partitioner.test_matches(id) {
                        seen[idx] += 1;
                    }
                }
            }
            assert!(seen.iter().all(|&count| count == 1), "{seen:?}");
        }
    }
}
