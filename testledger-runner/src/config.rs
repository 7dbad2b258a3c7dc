// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for testledger.
//!
//! Configuration is layered, with later sources overriding earlier ones:
//!
//! 1. the defaults embedded in the binary (`default-config.toml`);
//! 2. `.config/testledger.toml` in the working root, or an explicitly passed config file;
//! 3. the `TESTLEDGER_REPORT_DIR` and `TESTLEDGER_MODE` environment variables;
//! 4. command-line overrides.

mod imp;
mod test_threads;

pub use imp::*;
pub use test_threads::*;
