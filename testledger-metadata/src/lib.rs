// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the data testledger exchanges with test engines.
//!
//! Test engines report lifecycle events to testledger as JSON lines, one [`EventSummary`] per
//! line. testledger itself documents its process exit codes in [`TestledgerExitCode`].

mod errors;
mod events;
mod exit_codes;

pub use errors::*;
pub use events::*;
pub use exit_codes::*;
