// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The process executor.
//!
//! The main structure in this module is [`TestRunner`]. Each test runs as a child process built
//! from a [`TestCommand`] template. Workers report back over a channel to a single loop that owns
//! the [`RunCoordinator`](crate::coordinator::RunCoordinator), so every status and report write
//! happens on one logical writer.

mod command;
mod imp;

pub use command::*;
pub use imp::*;
