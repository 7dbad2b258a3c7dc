// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for testledger, a tracker for test execution state.
//!
//! A test run flows through these pieces:
//!
//! 1. [`coordinator::RunCoordinator::init`] checks for an existing status store and, if one
//!    exists, plans a rerun with [`rerun::RerunPlanner`].
//! 2. [`test_list::TestList`] is filtered through a [`test_filter::TestFilterBuilder`], which
//!    combines the rerun filter, name patterns and partitioning.
//! 3. [`runner::TestRunner`] runs the selected tests in parallel, handing each result to the
//!    coordinator, which records it in the [`status_store::StatusStore`] and the
//!    [`report::ReportSink`].
//! 4. [`reporter::DisplayReporter`] prints progress as [`reporter::TestEvent`]s arrive.

pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod errors;
mod helpers;
pub mod identity;
pub mod partition;
pub mod report;
pub mod reporter;
pub mod rerun;
pub mod run_mode;
pub mod runner;
pub mod status_store;
pub mod test_filter;
pub mod test_list;
mod time;
