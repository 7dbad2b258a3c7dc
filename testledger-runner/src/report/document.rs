// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;
use swrite::{SWrite, swrite, swriteln};
use testledger_metadata::SuiteCounts;

/// The color of a module summary block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SummaryState {
    /// At least one test ran and none failed.
    Pass,

    /// At least one test failed.
    Fail,

    /// No tests ran.
    Empty,
}

impl SummaryState {
    /// Computes the state for a set of counts.
    pub fn from_counts(counts: &SuiteCounts) -> Self {
        if counts.failed > 0 {
            Self::Fail
        } else if counts.is_empty() {
            Self::Empty
        } else {
            Self::Pass
        }
    }

    fn background(self) -> &'static str {
        match self {
            Self::Pass => "#c8f7c5",
            Self::Fail => "#f7c5c5",
            Self::Empty => "#e0e0e0",
        }
    }
}

/// Builds report markup incrementally.
///
/// Markup accumulates in a pending buffer that the caller drains with [`Self::take_pending`]
/// and appends to the report file. The document tracks whether the failure list is open, so
/// [`Self::open_list`] and [`Self::close_list`] are safe to call at any time.
#[derive(Debug, Default)]
pub struct HtmlDocument {
    pending: String,
    list_open: bool,
}

impl HtmlDocument {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a failure list is currently open.
    pub fn is_list_open(&self) -> bool {
        self.list_open
    }

    /// Writes the document head, including the auto-refresh meta tag.
    pub fn head(&mut self, title: &str, refresh: Duration) {
        swriteln!(self.pending, "<!DOCTYPE html>");
        swriteln!(self.pending, "<html>");
        swriteln!(self.pending, "<head>");
        swriteln!(self.pending, "<meta charset=\"utf-8\">");
        swriteln!(
            self.pending,
            "<meta http-equiv=\"refresh\" content=\"{}\">",
            refresh.as_secs().max(1)
        );
        swriteln!(self.pending, "<title>{}</title>", escape(title));
        swriteln!(self.pending, "</head>");
        swriteln!(self.pending, "<body>");
    }

    /// Writes a run heading.
    pub fn heading(&mut self, title: &str, started_at: &str) {
        self.close_list();
        swriteln!(
            self.pending,
            "<h1>{}</h1>\n<p>Started {}</p>",
            escape(title),
            escape(started_at)
        );
    }

    /// Opens a failure list if one isn't open.
    pub fn open_list(&mut self) {
        if !self.list_open {
            swriteln!(self.pending, "<ul>");
            self.list_open = true;
        }
    }

    /// Closes the failure list if one is open.
    pub fn close_list(&mut self) {
        if self.list_open {
            swriteln!(self.pending, "</ul>");
            self.list_open = false;
        }
    }

    /// Closes a list that an earlier writer of the same file left open.
    pub fn close_unterminated_list(&mut self) {
        if !self.list_open {
            swriteln!(self.pending, "</ul>");
        }
    }

    /// Appends a link to the failure list, opening it if needed.
    pub fn list_link(&mut self, text: &str, href: &str) {
        self.open_list();
        swriteln!(
            self.pending,
            "<li><a href=\"{}\">{}</a></li>",
            escape(href),
            escape(text)
        );
    }

    /// Writes a colored module summary block. Closes the current list first.
    pub fn summary(&mut self, module_name: &str, counts: &SuiteCounts) {
        self.close_list();
        let state = SummaryState::from_counts(counts);
        swrite!(
            self.pending,
            "<div class=\"summary\" style=\"background-color: {}; padding: 0.5em;\">",
            state.background()
        );
        swriteln!(
            self.pending,
            "<b>{}</b>: {} tests, {} failed, {} passed, {} skipped</div>",
            escape(module_name),
            counts.total,
            counts.failed,
            counts.passed,
            counts.skipped
        );
    }

    /// Drains the markup written since the last call.
    pub fn take_pending(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}

/// Escapes text for use in HTML content and attribute values.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
