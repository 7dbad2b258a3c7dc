// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while reading a JSON-lines event stream.
#[derive(Debug)]
pub enum EventParseError {
    /// Reading a line from the underlying reader failed.
    Read {
        /// The 1-based line number.
        line_number: usize,

        /// The underlying I/O error.
        error: std::io::Error,
    },

    /// A line was not a valid event.
    Json {
        /// The 1-based line number.
        line_number: usize,

        /// The underlying JSON error.
        error: serde_json::Error,
    },
}

impl EventParseError {
    /// Returns the 1-based line number at which the error occurred.
    pub fn line_number(&self) -> usize {
        match self {
            Self::Read { line_number, .. } | Self::Json { line_number, .. } => *line_number,
        }
    }
}

impl fmt::Display for EventParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Read { line_number, .. } => {
                write!(f, "error reading event stream at line {line_number}")
            }
            Self::Json { line_number, .. } => {
                write!(f, "invalid event at line {line_number}")
            }
        }
    }
}

impl error::Error for EventParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Read { error, .. } => Some(error),
            Self::Json { error, .. } => Some(error),
        }
    }
}
