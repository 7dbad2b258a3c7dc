// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use testledger_metadata::{EventParseError, TestledgerExitCode};
use testledger_runner::errors::*;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that testledger expects may happen, each with a documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("fixture missing")]
    FixtureMissing {
        #[from]
        err: FixtureMissingError,
    },
    #[error("tracking disabled")]
    TrackingDisabled,
    #[error("test list parse error")]
    TestListParseError {
        #[from]
        err: TestListParseError,
    },
    #[error("test filter build error")]
    TestFilterBuilderError {
        #[from]
        err: TestFilterBuilderError,
    },
    #[error("test runner setup error")]
    TestRunnerSetupError {
        #[source]
        err: ExecutorError,
    },
    #[error("coordinator error")]
    CoordinatorError {
        #[source]
        err: CoordinatorError,
    },
    #[error("input file read error")]
    InputFileReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("event parse error")]
    EventParseError {
        #[from]
        err: EventParseError,
    },
    #[error("JSON serialize error")]
    JsonSerializeError {
        #[source]
        err: serde_json::Error,
    },
    #[error("write output error")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn executor(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Coordinator(err) => Self::CoordinatorError { err },
            err => Self::TestRunnerSetupError { err },
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::FixtureMissing { .. }
            | Self::TrackingDisabled
            | Self::TestFilterBuilderError { .. }
            | Self::TestRunnerSetupError { .. }
            | Self::InputFileReadError { .. } => TestledgerExitCode::SETUP_ERROR,
            Self::CoordinatorError { err } => match err {
                CoordinatorError::State(_) | CoordinatorError::InvalidIdentity(_) => {
                    TestledgerExitCode::INVALID_EVENT_STREAM
                }
                err if err.is_setup_error() => TestledgerExitCode::SETUP_ERROR,
                _ => TestledgerExitCode::REPORT_WRITE_FAILED,
            },
            Self::TestListParseError { .. } => TestledgerExitCode::TEST_LIST_CREATION_FAILED,
            Self::EventParseError { .. } => TestledgerExitCode::INVALID_EVENT_STREAM,
            Self::JsonSerializeError { .. } | Self::WriteOutputError { .. } => {
                TestledgerExitCode::WRITE_OUTPUT_ERROR
            }
            Self::TestRunFailed => TestledgerExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse testledger config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::FixtureMissing { err } => {
                error!(
                    "required fixture `{}` is missing",
                    err.path().style(styles.bold)
                );
                None
            }
            Self::TrackingDisabled => {
                error!(
                    "tracking is disabled: set {} and {} (or pass {} and {})",
                    "report-dir".style(styles.bold),
                    "mode".style(styles.bold),
                    "--report-dir".style(styles.bold),
                    "--mode".style(styles.bold),
                );
                None
            }
            Self::TestListParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestFilterBuilderError { err } => {
                error!("{err}");
                err.source()
            }
            Self::TestRunnerSetupError { err } => {
                error!("failed to set up the test runner");
                Some(err as &dyn Error)
            }
            Self::CoordinatorError { err } => {
                match err {
                    CoordinatorError::State(err) => {
                        error!("invalid event order: {err}");
                        return;
                    }
                    err if err.is_setup_error() => {
                        error!("failed to set up the report directory");
                    }
                    _ => {
                        error!("failed to record test results");
                    }
                }
                Some(err as &dyn Error)
            }
            Self::InputFileReadError { path, err } => {
                error!("failed to read input file `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::EventParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::JsonSerializeError { err } => {
                error!("failed to serialize output to JSON");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
