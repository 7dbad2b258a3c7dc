// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The live HTML report.
//!
//! The main structure in this module is [`ReportSink`], which appends to `index.html` in the
//! report root as tests fail and modules finish.

mod document;
mod sink;

pub use document::{HtmlDocument, SummaryState};
pub use sink::{REPORT_FILE_NAME, ReportSink, detail_url};
