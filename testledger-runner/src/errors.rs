// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testledger.

use crate::{coordinator::CoordinatorState, run_mode::RunMode, status_store::StatusKind};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{borrow::Cow, error, fmt, io};
use thiserror::Error;

/// A test identity could not be recorded.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("invalid test identity `{class_name}` / `{test_name}`: {reason}")]
pub struct InvalidTestIdentity {
    class_name: String,
    test_name: String,
    reason: InvalidTestIdentityReason,
}

impl InvalidTestIdentity {
    pub(crate) fn new(
        class_name: impl Into<String>,
        test_name: impl Into<String>,
        reason: InvalidTestIdentityReason,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            test_name: test_name.into(),
            reason,
        }
    }

    /// Returns the reason the identity was rejected.
    pub fn reason(&self) -> InvalidTestIdentityReason {
        self.reason
    }
}

/// The reason a [`TestIdentity`](crate::identity::TestIdentity) was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvalidTestIdentityReason {
    /// The class name was empty.
    EmptyClassName,

    /// The test name was empty.
    EmptyTestName,

    /// The class name contained a newline.
    NewlineInClassName,

    /// The test name contained a newline.
    NewlineInTestName,
}

impl fmt::Display for InvalidTestIdentityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyClassName => write!(f, "class name is empty"),
            Self::EmptyTestName => write!(f, "test name is empty"),
            Self::NewlineInClassName => write!(f, "class name contains a newline"),
            Self::NewlineInTestName => write!(f, "test name contains a newline"),
        }
    }
}

/// An error that occurred while reading or writing the status store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatusStoreError {
    /// The report root could not be created.
    #[error("error creating report directory `{path}`")]
    RootCreate {
        /// The report root.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A per-test directory could not be created.
    #[error("error creating test directory `{path}`")]
    TestDirCreate {
        /// The directory that could not be created.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A status marker or diagnostic file could not be written.
    #[error("error writing `{path}`")]
    FileWrite {
        /// The file that could not be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },

    /// A status marker could not be removed.
    #[error("error removing status marker `{path}`")]
    MarkerRemove {
        /// The marker that could not be removed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The status markers for a test could not be read.
    #[error("error reading status marker `{path}`")]
    MarkerRead {
        /// The marker that could not be read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while writing the HTML report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportSinkError {
    /// The report file could not be opened.
    #[error("error opening report `{path}`")]
    Open {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Markup was written before the run was started.
    #[error("report `{path}` written to before the run started")]
    NotStarted {
        /// The report file.
        path: Utf8PathBuf,
    },

    /// Markup could not be appended to the report file.
    #[error("error appending to report `{path}`")]
    Append {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse testledger config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &camino::Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing the config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the layered config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// A configured fixture path does not exist.
#[derive(Clone, Debug, Error)]
#[error("fixture `{path}` does not exist (is it downloaded?)")]
pub struct FixtureMissingError {
    path: Utf8PathBuf,
}

impl FixtureMissingError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the missing path.
    pub fn path(&self) -> &camino::Utf8Path {
        &self.path
    }
}

/// Error returned while parsing a [`TestThreads`](crate::config::TestThreads) value.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for test-threads: {input}\n(hint: expected either an integer or \"num-cpus\")"
)]
pub struct TestThreadsParseError {
    input: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a [`RunMode`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for run mode: {input}\n(known values: {})",
    RunMode::variants().join(", ")
)]
pub struct RunModeParseError {
    input: String,
}

impl RunModeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a [`StatusKind`] from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized status kind: {input}\n(known values: {})",
    StatusKind::ALL.iter().map(|kind| kind.file_name()).collect::<Vec<_>>().join(", ")
)]
pub struct StatusKindParseError {
    input: String,
}

impl StatusKindParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while parsing a
/// [`PartitionerBuilder`](crate::partition::PartitionerBuilder) input.
#[derive(Clone, Debug, Error)]
pub struct PartitionerBuilderParseError {
    expected_format: Option<&'static str>,
    message: Cow<'static, str>,
}

impl PartitionerBuilderParseError {
    pub(crate) fn new(
        expected_format: Option<&'static str>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            expected_format,
            message: message.into(),
        }
    }
}

impl fmt::Display for PartitionerBuilderParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.expected_format {
            Some(format) => {
                write!(
                    f,
                    "partition must be in the format \"{}\":\n{}",
                    format, self.message
                )
            }
            None => write!(f, "{}", self.message),
        }
    }
}

/// An error that occurred while building a test filter.
#[derive(Clone, Debug, Error)]
#[error("error building test filter")]
pub struct TestFilterBuilderError {
    #[from]
    error: aho_corasick::BuildError,
}

/// An error that occurred while reading a test list file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestListParseError {
    /// The test list file could not be read.
    #[error("error reading test list `{path}`")]
    Read {
        /// The test list file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A line was not of the form `<className> <testName>`.
    #[error("{path}:{line_number}: expected `<class-name> <test-name>`, found `{line}`")]
    MalformedLine {
        /// The test list file.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The offending line.
        line: String,
    },

    /// A line named a test that cannot be recorded.
    #[error("{path}:{line_number}: invalid test")]
    InvalidIdentity {
        /// The test list file.
        path: Utf8PathBuf,

        /// The 1-based line number.
        line_number: usize,

        /// The underlying error.
        #[source]
        error: InvalidTestIdentity,
    },

    /// A test was listed more than once.
    #[error("{path}:{line_number}: test `{identity}` was already listed on line {first_line}")]
    Duplicate {
        /// The test list file.
        path: Utf8PathBuf,

        /// The 1-based line number of the duplicate.
        line_number: usize,

        /// The 1-based line number of the first occurrence.
        first_line: usize,

        /// The duplicated identity, in `Class.test` form.
        identity: String,
    },
}

/// A lifecycle hook was called in the wrong state.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("`{hook}` called while the run coordinator is {state}")]
pub struct CoordinatorStateError {
    hook: &'static str,
    state: CoordinatorState,
}

impl CoordinatorStateError {
    pub(crate) fn new(hook: &'static str, state: CoordinatorState) -> Self {
        Self { hook, state }
    }

    /// Returns the name of the hook that was called.
    pub fn hook(&self) -> &'static str {
        self.hook
    }

    /// Returns the state the coordinator was in.
    pub fn state(&self) -> CoordinatorState {
        self.state
    }
}

/// An error that occurred within the run coordinator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorError {
    /// The status store could not be accessed.
    #[error("error accessing the status store")]
    StatusStore(#[from] StatusStoreError),

    /// The report could not be written.
    #[error("error writing the report")]
    ReportSink(#[from] ReportSinkError),

    /// A lifecycle hook was called in the wrong state.
    #[error(transparent)]
    State(#[from] CoordinatorStateError),

    /// A test identity was rejected.
    #[error(transparent)]
    InvalidIdentity(#[from] InvalidTestIdentity),
}

impl CoordinatorError {
    /// Returns true if this error happened while setting up the run, before any test was recorded.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::StatusStore(StatusStoreError::RootCreate { .. })
                | Self::ReportSink(ReportSinkError::Open { .. })
        )
    }
}

/// An error that occurred while building or running the process executor.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The Tokio runtime could not be created.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// The command template was empty.
    #[error("test command is empty")]
    EmptyCommand,

    /// The command template could not be split into arguments.
    #[error("error parsing test command `{command}`")]
    CommandParse {
        /// The command template.
        command: String,

        /// The underlying error.
        #[source]
        error: shell_words::ParseError,
    },

    /// The coordinator failed while recording results.
    #[error("error recording test results")]
    Coordinator(#[from] CoordinatorError),
}

/// Displays an error and its chain of sources.
///
/// With the alternate flag (`{:#}`) the chain is written on one line, separated by `: `.
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() && !f.alternate() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(err) = source {
            if f.alternate() {
                write!(f, ": {err}")?;
            } else {
                write!(f, "\n  - {err}")?;
            }
            source = err.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_chain() {
        let error = StatusStoreError::MarkerRead {
            path: "report/a.Foo/bar/FAILURE".into(),
            error: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };

        assert_eq!(
            format!("{:#}", DisplayErrorChain::new(&error)),
            "error reading status marker `report/a.Foo/bar/FAILURE`: access denied",
        );
        assert_eq!(
            DisplayErrorChain::new(&error).to_string(),
            "error reading status marker `report/a.Foo/bar/FAILURE`\n  caused by:\n  - access denied",
        );
    }
}
