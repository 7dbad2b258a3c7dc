// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for testledger-runner.

use std::{fmt, process::ExitStatus};

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        tests_plural_if(count != 1)
    }

    /// Returns "tests" if `plural` is true, otherwise "test".
    pub fn tests_plural_if(plural: bool) -> &'static str {
        if plural { "tests" } else { "test" }
    }

    /// Returns "frame" if `count` is 1, otherwise "frames".
    pub fn frames_str(count: usize) -> &'static str {
        if count == 1 { "frame" } else { "frames" }
    }
}

/// A counter index like `( 3/20)`.
#[derive(Clone, Copy, Debug)]
pub struct DisplayCounterIndex {
    current: usize,
    total: usize,
}

impl DisplayCounterIndex {
    /// Creates a new counter display.
    pub fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }
}

impl fmt::Display for DisplayCounterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:>width$}/{})",
            self.current,
            self.total,
            width = usize_decimal_char_width(self.total)
        )
    }
}

pub(crate) fn usize_decimal_char_width(n: usize) -> usize {
    // checked_ilog10 returns 0 for 1-9, 1 for 10-99, and so on (None for 0).
    n.checked_ilog10().unwrap_or(0) as usize + 1
}

// "exited with"/"terminated via"
pub(crate) fn display_exited_with(exit_status: ExitStatus) -> String {
    match exit_status.code() {
        Some(code) => format!("exited with exit code {code}"),
        None => display_signal(exit_status),
    }
}

#[cfg(unix)]
fn display_signal(exit_status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match exit_status.signal() {
        Some(sig) => match signal_str(sig) {
            Some(s) => format!("aborted with signal {sig} (SIG{s})"),
            None => format!("aborted with signal {sig}"),
        },
        None => "exited with an unknown error".to_owned(),
    }
}

#[cfg(not(unix))]
fn display_signal(_exit_status: ExitStatus) -> String {
    "exited with an unknown error".to_owned()
}

#[cfg(unix)]
pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS, FreeBSD and illumos.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decimal_char_width() {
        assert_eq!(1, usize_decimal_char_width(0));
        assert_eq!(1, usize_decimal_char_width(1));
        assert_eq!(1, usize_decimal_char_width(9));
        assert_eq!(2, usize_decimal_char_width(10));
        assert_eq!(2, usize_decimal_char_width(99));
        assert_eq!(3, usize_decimal_char_width(100));
        assert_eq!(3, usize_decimal_char_width(999));
    }

    #[test]
    fn counter_index() {
        assert_eq!(DisplayCounterIndex::new(3, 20).to_string(), "( 3/20)");
        assert_eq!(DisplayCounterIndex::new(1, 1).to_string(), "(1/1)");
    }

    #[cfg(unix)]
    #[test]
    fn exited_with() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            display_exited_with(ExitStatus::from_raw(1 << 8)),
            "exited with exit code 1"
        );
        assert_eq!(
            display_exited_with(ExitStatus::from_raw(9)),
            "aborted with signal 9 (SIGKILL)"
        );
    }
}
