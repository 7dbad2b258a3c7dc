// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testledger` failures.
///
/// `testledger` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TestledgerExitCode {}

impl TestledgerExitCode {
    /// No errors occurred and testledger exited normally.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    ///
    /// This is the expected outcome of a `failing` rerun after every failure was fixed.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more tests failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Reading the list of tests to run produced an error.
    pub const TEST_LIST_CREATION_FAILED: i32 = 104;

    /// A lifecycle event read by `testledger ingest` could not be parsed or was out of order.
    pub const INVALID_EVENT_STREAM: i32 = 105;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a testledger invocation.
    ///
    /// This covers configuration errors and a report directory that cannot be created.
    pub const SETUP_ERROR: i32 = 96;

    /// The status store or report could not be written during a run.
    pub const REPORT_WRITE_FAILED: i32 = 97;
}
