// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out and aggregates test execution statuses.
//!
//! The main structure in this module is [`DisplayReporter`].

mod displayer;
mod events;

pub use displayer::*;
pub use events::*;
