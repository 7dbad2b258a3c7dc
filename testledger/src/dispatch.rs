// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line parsing and command routing.

mod app;
mod common;
mod ingest;
mod plan;
mod run;
mod show_config;
mod status;

pub use app::TestledgerApp;
