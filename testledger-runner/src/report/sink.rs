// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::HtmlDocument;
use crate::{
    errors::ReportSinkError, identity::TestIdentity, status_store::FILTERED_EXCEPTIONS_FILE_NAME,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    time::Duration,
};
use swrite::{SWrite, swrite};
use testledger_metadata::SuiteCounts;
use tracing::debug;

/// The name of the report file inside the report root.
pub const REPORT_FILE_NAME: &str = "index.html";

/// Returns the link, relative to the report file, to the filtered stack trace of `identity`.
pub fn detail_url(identity: &TestIdentity) -> String {
    let (class_segment, test_segment) = identity.encode_segments();
    format!(
        "{}/{}/{}",
        percent_encode(&class_segment),
        percent_encode(&test_segment),
        FILTERED_EXCEPTIONS_FILE_NAME
    )
}

fn percent_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => swrite!(out, "%{other:02X}"),
        }
    }
    out
}

/// The append-only HTML report for a run.
///
/// All methods must be called from a single writer. [`RunCoordinator`] owns the sink and
/// serializes every call.
///
/// [`RunCoordinator`]: crate::coordinator::RunCoordinator
#[derive(Debug)]
pub struct ReportSink {
    path: Utf8PathBuf,
    refresh: Duration,
    file: Option<File>,
    document: HtmlDocument,
}

impl ReportSink {
    /// Creates a new sink for `index.html` in `report_root`. Nothing is written until
    /// [`Self::begin_run`] is called.
    pub fn new(report_root: &Utf8Path, refresh: Duration) -> Self {
        Self {
            path: report_root.join(REPORT_FILE_NAME),
            refresh,
            file: None,
            document: HtmlDocument::new(),
        }
    }

    /// Returns the path to the report file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Opens the report, writes the header and opens the failure list.
    ///
    /// An existing report (from a run being resumed) is appended to: it gets a new run heading
    /// but not a second document head.
    pub fn begin_run(&mut self, title: &str) -> Result<(), ReportSinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|error| ReportSinkError::Open {
                path: self.path.clone(),
                error,
            })?;
        let is_new = file
            .metadata()
            .map_err(|error| ReportSinkError::Open {
                path: self.path.clone(),
                error,
            })?
            .len()
            == 0;
        self.file = Some(file);

        if is_new {
            self.document.head(title, self.refresh);
        } else {
            // A run that stopped before `finish_run` leaves its last list open.
            let existing =
                std::fs::read_to_string(&self.path).map_err(|error| ReportSinkError::Open {
                    path: self.path.clone(),
                    error,
                })?;
            let unclosed = existing
                .matches("<ul>")
                .count()
                .saturating_sub(existing.matches("</ul>").count());
            for _ in 0..unclosed {
                self.document.close_unterminated_list();
            }
        }
        let started_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.document.heading(title, &started_at);
        self.document.open_list();

        debug!(path = %self.path, is_new, "began report");
        self.flush()
    }

    /// Appends a link to a failing test's details.
    pub fn record_failure_link(
        &mut self,
        identity: &TestIdentity,
        detail_url: &str,
    ) -> Result<(), ReportSinkError> {
        self.document.list_link(&identity.to_string(), detail_url);
        self.flush()
    }

    /// Closes the current failure list, writes the module summary and opens a new list.
    pub fn finalize_module(
        &mut self,
        module_name: &str,
        counts: &SuiteCounts,
    ) -> Result<(), ReportSinkError> {
        self.document.summary(module_name, counts);
        self.document.open_list();
        self.flush()
    }

    /// Closes the failure list left open by the last module summary.
    ///
    /// The report stays readable without this, but a later resumed run appends cleanly only if
    /// the previous run finished.
    pub fn finish_run(&mut self) -> Result<(), ReportSinkError> {
        self.document.close_list();
        debug!(path = %self.path, "finished report");
        self.flush()
    }

    fn flush(&mut self) -> Result<(), ReportSinkError> {
        let Some(file) = self.file.as_mut() else {
            return Err(ReportSinkError::NotStarted {
                path: self.path.clone(),
            });
        };

        let pending = self.document.take_pending();
        file.write_all(pending.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|error| ReportSinkError::Append {
                path: self.path.clone(),
                error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::document::escape;

    fn id(class_name: &str, test_name: &str) -> TestIdentity {
        TestIdentity::new(class_name, test_name).unwrap()
    }

    #[test]
    fn detail_url_encoding() {
        assert_eq!(
            detail_url(&id("com.example.FooTest", "testBar")),
            "com.example.FooTest/testBar/exceptions-filtered.txt"
        );
        assert_eq!(
            detail_url(&id("A", "[1] x#y z")),
            "A/%5B1%5D%20x%23y%20z/exceptions-filtered.txt"
        );
        assert_eq!(
            detail_url(&id("A", "a/b")),
            "A/a_sb/exceptions-filtered.txt"
        );
    }

    #[test]
    fn write_before_begin_fails() {
        let dir = camino_tempfile::tempdir().unwrap();
        let mut sink = ReportSink::new(dir.path(), Duration::from_secs(10));
        let err = sink
            .record_failure_link(&id("A", "t1"), "A/t1/exceptions-filtered.txt")
            .unwrap_err();
        assert!(matches!(err, ReportSinkError::NotStarted { .. }));
    }

    #[test]
    fn lists_are_balanced_per_module() {
        let dir = camino_tempfile::tempdir().unwrap();
        let mut sink = ReportSink::new(dir.path(), Duration::from_secs(10));

        sink.begin_run("suite").unwrap();
        let a = id("A", "t1");
        sink.record_failure_link(&a, &detail_url(&a)).unwrap();
        sink.finalize_module(
            "first",
            &SuiteCounts {
                total: 2,
                failed: 1,
                passed: 1,
                skipped: 0,
            },
        )
        .unwrap();
        sink.finalize_module("second", &SuiteCounts::default())
            .unwrap();

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents.matches("<ul>").count(), 3);
        assert_eq!(contents.matches("</ul>").count(), 2);
        assert_eq!(contents.matches("<li>").count(), 1);
        assert!(contents.contains(&escape("A.t1")));
        assert!(contents.contains("#e0e0e0"), "empty module is grey");
    }

    #[test]
    fn resumed_report_is_appended() {
        let dir = camino_tempfile::tempdir().unwrap();

        for _ in 0..3 {
            let mut sink = ReportSink::new(dir.path(), Duration::from_secs(10));
            sink.begin_run("suite").unwrap();
            sink.finalize_module("m", &SuiteCounts::default()).unwrap();
            sink.finish_run().unwrap();
        }

        let contents = std::fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
        assert_eq!(contents.matches("<head>").count(), 1);
        assert_eq!(contents.matches("<h1>suite</h1>").count(), 3);
        assert_eq!(
            contents.matches("<ul>").count(),
            contents.matches("</ul>").count()
        );
        assert!(!contents.contains("<ul>\n<h1>"), "heading nested in a list");
    }

    #[test]
    fn interrupted_run_list_is_closed_on_resume() {
        let dir = camino_tempfile::tempdir().unwrap();

        // Runs that never reach `finish_run` leave a list open.
        for _ in 0..3 {
            let mut sink = ReportSink::new(dir.path(), Duration::from_secs(10));
            sink.begin_run("suite").unwrap();
            sink.finalize_module("m", &SuiteCounts::default()).unwrap();
        }

        let contents = std::fs::read_to_string(dir.path().join(REPORT_FILE_NAME)).unwrap();
        let opens = contents.matches("<ul>").count();
        let closes = contents.matches("</ul>").count();
        assert!(opens - closes <= 1, "opens={opens} closes={closes}");
        assert!(!contents.contains("<ul>\n<h1>"), "heading nested in a list");
    }
}
