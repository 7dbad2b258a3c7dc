// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(unix)]
mod executor;
mod fixtures;
mod rerun_scenario;
