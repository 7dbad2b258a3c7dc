// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The on-disk record of per-test outcomes.
//!
//! Each test gets a directory `<root>/<class>/<test>` (names encoded with
//! [`TestIdentity::encode_segments`]) holding zero-payload status markers named after a
//! [`StatusKind`], plus the `time` file and failure diagnostics. When a name is too long for a
//! path segment, the directory also holds an `identity` file with the full names.

use crate::{
    diagnostics::CapturedDiagnostics,
    errors::{DisplayErrorChain, StatusKindParseError, StatusStoreError},
    identity::TestIdentity,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeSet, fmt, io, io::Write, str::FromStr, time::Duration};
use testledger_metadata::TestResultSummary;
use tracing::{debug, warn};

/// The name of the elapsed-time file inside a test directory.
pub const TIME_FILE_NAME: &str = "time";

/// The name of the raw stack trace file inside a test directory.
pub const RAW_EXCEPTIONS_FILE_NAME: &str = "exceptions-raw.txt";

/// The name of the filtered stack trace file inside a test directory.
pub const FILTERED_EXCEPTIONS_FILE_NAME: &str = "exceptions-filtered.txt";

/// The name of the captured standard output file inside a test directory.
pub const STDOUT_FILE_NAME: &str = "stdout.txt";

/// The name of the captured standard error file inside a test directory.
pub const STDERR_FILE_NAME: &str = "stderr.txt";

/// The name of the file holding the full names of an identity whose directory names are hashed.
pub const IDENTITY_FILE_NAME: &str = "identity";

/// A status marker for a test.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StatusKind {
    /// The most recent run of the test passed (or was skipped).
    Success,

    /// The most recent run of the test failed.
    Failure,

    /// The test has failed at least once. Never removed automatically.
    PastFailure,
}

impl StatusKind {
    /// All status kinds.
    pub const ALL: [Self; 3] = [Self::Success, Self::Failure, Self::PastFailure];

    /// Returns the marker file name for this status.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::PastFailure => "PAST_FAILURE",
        }
    }

    /// Returns the status that writing `self` removes, if any.
    pub fn opposite(self) -> Option<Self> {
        match self {
            Self::Success => Some(Self::Failure),
            Self::Failure => Some(Self::Success),
            Self::PastFailure => None,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

impl FromStr for StatusKind {
    type Err = StatusKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "SUCCESS" | "success" => Self::Success,
            "FAILURE" | "failure" => Self::Failure,
            "PAST_FAILURE" | "past-failure" => Self::PastFailure,
            other => return Err(StatusKindParseError::new(other)),
        };
        Ok(kind)
    }
}

/// Maps a test result to the status bucket it is recorded in.
///
/// Skipped tests count as successes: they have nothing outstanding to rerun.
pub fn result_to_status(result: TestResultSummary) -> StatusKind {
    match result {
        TestResultSummary::Success | TestResultSummary::Skipped => StatusKind::Success,
        TestResultSummary::Failure => StatusKind::Failure,
    }
}

/// A handle to the status records under a report root.
///
/// Safe to share between concurrent writers as long as each writer works on a different
/// identity. Concurrent writes to the same identity are last-writer-wins.
#[derive(Clone, Debug)]
pub struct StatusStore {
    root: Utf8PathBuf,
}

impl StatusStore {
    /// Creates a new handle for the given report root. Nothing is created on disk.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the report root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns true if the report root exists, i.e. a previous run can be resumed.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Creates the report root if it doesn't exist.
    pub fn create_root(&self) -> Result<(), StatusStoreError> {
        std::fs::create_dir_all(&self.root).map_err(|error| StatusStoreError::RootCreate {
            path: self.root.clone(),
            error,
        })
    }

    /// Returns the directory holding the records for `identity`.
    pub fn test_dir(&self, identity: &TestIdentity) -> Utf8PathBuf {
        let (class_segment, test_segment) = identity.encode_segments();
        let mut dir = self.root.join(class_segment);
        dir.push(test_segment);
        dir
    }

    /// Returns the path of the `kind` marker for `identity`.
    pub fn marker_path(&self, identity: &TestIdentity, kind: StatusKind) -> Utf8PathBuf {
        self.test_dir(identity).join(kind.file_name())
    }

    /// Writes the `kind` marker for `identity`.
    ///
    /// Writing `SUCCESS` or `FAILURE` removes the other one. Writing `FAILURE` also writes
    /// `PAST_FAILURE`. Writing the same status again is a no-op apart from timestamps.
    ///
    /// The opposite marker is removed before the new one is written: an interrupted write leaves
    /// at most one of `SUCCESS` and `FAILURE`.
    pub fn write(&self, identity: &TestIdentity, kind: StatusKind) -> Result<(), StatusStoreError> {
        let dir = self.ensure_test_dir(identity)?;

        if let Some(opposite) = kind.opposite() {
            let path = dir.join(opposite.file_name());
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(StatusStoreError::MarkerRemove { path, error }),
            }
        }
        if kind == StatusKind::Failure {
            write_file(&dir.join(StatusKind::PastFailure.file_name()), b"")?;
        }
        write_file(&dir.join(kind.file_name()), b"")?;

        debug!(%identity, status = %kind, "wrote status marker");
        Ok(())
    }

    /// Writes the elapsed time for `identity`.
    pub fn write_time(
        &self,
        identity: &TestIdentity,
        duration: Duration,
    ) -> Result<(), StatusStoreError> {
        let dir = self.ensure_test_dir(identity)?;
        let contents = format!("{:.3}s\n", duration.as_secs_f64());
        write_file(&dir.join(TIME_FILE_NAME), contents.as_bytes())
    }

    /// Writes the failure diagnostics for `identity`: the raw stack trace first, then the
    /// filtered one, then any captured output.
    pub fn write_diagnostics(
        &self,
        identity: &TestIdentity,
        diagnostics: &CapturedDiagnostics,
    ) -> Result<(), StatusStoreError> {
        let dir = self.ensure_test_dir(identity)?;

        write_file(
            &dir.join(RAW_EXCEPTIONS_FILE_NAME),
            diagnostics.raw_stack_trace().as_bytes(),
        )?;
        write_file(
            &dir.join(FILTERED_EXCEPTIONS_FILE_NAME),
            diagnostics.filtered_stack_trace().as_bytes(),
        )?;
        if !diagnostics.stdout().is_empty() {
            write_file(&dir.join(STDOUT_FILE_NAME), diagnostics.stdout().as_bytes())?;
        }
        if !diagnostics.stderr().is_empty() {
            write_file(&dir.join(STDERR_FILE_NAME), diagnostics.stderr().as_bytes())?;
        }

        Ok(())
    }

    /// Returns the markers currently present for `identity`.
    pub fn statuses(&self, identity: &TestIdentity) -> Result<BTreeSet<StatusKind>, StatusStoreError> {
        let dir = self.test_dir(identity);
        let mut statuses = BTreeSet::new();
        for kind in StatusKind::ALL {
            let path = dir.join(kind.file_name());
            match path.try_exists() {
                Ok(true) => {
                    statuses.insert(kind);
                }
                Ok(false) => {}
                Err(error) => return Err(StatusStoreError::MarkerRead { path, error }),
            }
        }
        Ok(statuses)
    }

    /// Returns a lazy iterator over every identity with a `kind` marker.
    ///
    /// Each call walks the report root again. The order is unspecified. Entries that can't be
    /// decoded are skipped with a warning.
    pub fn scan(&self, kind: StatusKind) -> StatusScan {
        StatusScan {
            root: self.root.clone(),
            kind,
            walker: walkdir::WalkDir::new(&self.root)
                .min_depth(3)
                .max_depth(3)
                .into_iter(),
        }
    }

    fn ensure_test_dir(&self, identity: &TestIdentity) -> Result<Utf8PathBuf, StatusStoreError> {
        let dir = self.test_dir(identity);
        std::fs::create_dir_all(&dir).map_err(|error| StatusStoreError::TestDirCreate {
            path: dir.clone(),
            error,
        })?;
        if identity.has_hashed_segment() {
            let path = dir.join(IDENTITY_FILE_NAME);
            if !path.is_file() {
                write_file(&path, identity.sidecar_contents().as_bytes())?;
            }
        }
        Ok(dir)
    }
}

fn write_file(path: &Utf8Path, contents: &[u8]) -> Result<(), StatusStoreError> {
    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
        .write(|file| file.write_all(contents))
        .map_err(|error| StatusStoreError::FileWrite {
            path: path.to_owned(),
            error,
        })
}

/// An iterator over the identities carrying a status marker, returned by
/// [`StatusStore::scan`].
#[derive(Debug)]
pub struct StatusScan {
    root: Utf8PathBuf,
    kind: StatusKind,
    walker: walkdir::IntoIter,
}

impl StatusScan {
    fn decode_entry(&self, entry: &walkdir::DirEntry) -> Option<TestIdentity> {
        let path = entry.path();
        let test_segment = path.parent()?.file_name()?.to_str()?;
        let class_segment = path.parent()?.parent()?.file_name()?.to_str()?;
        TestIdentity::decode_segments(class_segment, test_segment).or_else(|| {
            let contents = std::fs::read_to_string(path.parent()?.join(IDENTITY_FILE_NAME)).ok()?;
            TestIdentity::from_sidecar(&contents, class_segment, test_segment)
        })
    }
}

impl Iterator for StatusScan {
    type Item = TestIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(error) => {
                    // A missing root just means nothing has been recorded yet.
                    let root_missing = error.depth() == 0
                        && error
                            .io_error()
                            .is_some_and(|error| error.kind() == io::ErrorKind::NotFound);
                    if !root_missing {
                        warn!(
                            "skipping unreadable entry while scanning `{}`: {}",
                            self.root,
                            DisplayErrorChain::new(&error),
                        );
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() || entry.file_name() != self.kind.file_name() {
                continue;
            }

            match self.decode_entry(&entry) {
                Some(identity) => return Some(identity),
                None => {
                    warn!(
                        "skipping {} marker at `{}`: path does not decode to a test identity",
                        self.kind,
                        entry.path().display(),
                    );
                }
            }
        }
    }
}
