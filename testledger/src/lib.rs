// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracks the outcome of every test across runs of a large, slow test suite.
//!
//! `testledger run` executes a list of tests, records each outcome under a report directory, and
//! on the next invocation reruns only the tests the configured mode selects: everything,
//! outstanding tests, currently failing tests, or tests that ever failed. `testledger ingest`
//! records outcomes reported by an external test engine instead.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
