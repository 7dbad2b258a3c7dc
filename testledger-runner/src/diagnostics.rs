// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure diagnostics: captured output and stack traces.
//!
//! Stack traces are kept as-is (the raw trace) and also rewritten for display (the filtered
//! trace). Filtering collapses frames outside the configured product namespaces, keeping the one
//! frame per collapsed run that sits next to product code. The filtered trace is for humans only
//! and never affects whether a test passed.

use crate::helpers::plural;
use regex::Regex;
use std::sync::LazyLock;
use swrite::{SWrite, swriteln};

/// Diagnostics captured for a failing test.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapturedDiagnostics {
    raw_stack_trace: String,
    filtered_stack_trace: String,
    stdout: String,
    stderr: String,
}

impl CapturedDiagnostics {
    /// Creates a new `CapturedDiagnostics` from already-computed parts.
    pub fn new(
        raw_stack_trace: String,
        filtered_stack_trace: String,
        stdout: String,
        stderr: String,
    ) -> Self {
        Self {
            raw_stack_trace,
            filtered_stack_trace,
            stdout,
            stderr,
        }
    }

    /// Captures diagnostics for a failing test, computing the filtered trace with `filter`.
    ///
    /// If the engine reported no stack trace, the captured standard error is used instead.
    pub fn capture(
        filter: &StackTraceFilter,
        stack_trace: Option<String>,
        stdout: String,
        stderr: String,
    ) -> Self {
        let raw_stack_trace = stack_trace.unwrap_or_else(|| stderr.clone());
        let filtered_stack_trace = filter.filter(&raw_stack_trace);
        Self {
            raw_stack_trace,
            filtered_stack_trace,
            stdout,
            stderr,
        }
    }

    /// The stack trace as reported.
    pub fn raw_stack_trace(&self) -> &str {
        &self.raw_stack_trace
    }

    /// The stack trace with non-product frames collapsed.
    pub fn filtered_stack_trace(&self) -> &str {
        &self.filtered_stack_trace
    }

    /// Captured standard output.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}

// `at com.example.Foo.bar(Foo.java:12)`
static JVM_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*at\s+([^\s(]+)\(").expect("JVM frame regex is valid"));

// `  12: my_crate::module::function`
static NUMBERED_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+:\s+(\S+)").expect("numbered frame regex is valid"));

// `             at ./src/lib.rs:10:5`, the location line following a numbered frame.
static FRAME_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+at\s+\S").expect("frame location regex is valid"));

/// Rewrites stack traces for display, collapsing frames outside the product namespaces.
#[derive(Clone, Debug, Default)]
pub struct StackTraceFilter {
    namespaces: Vec<String>,
}

impl StackTraceFilter {
    /// Creates a new filter. A frame belongs to the product if its symbol starts with one of
    /// `namespaces`. With no namespaces, traces are returned unchanged.
    pub fn new(namespaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the product namespaces.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Filters a stack trace.
    ///
    /// Each run of consecutive non-product frames is replaced by the frame adjacent to product
    /// code (the one that re-enters product code, or for the innermost run, the one product code
    /// called) followed by a `... N frames elided` line. Lines that aren't frames are kept and end
    /// the current run.
    pub fn filter(&self, raw: &str) -> String {
        if self.namespaces.is_empty() {
            return raw.to_owned();
        }

        let mut out = String::with_capacity(raw.len());
        let mut run: Vec<Frame<'_>> = Vec::new();
        let mut seen_product = false;

        for frame in parse_frames(raw) {
            match frame.symbol {
                Some(symbol) if self.is_product(symbol) => {
                    flush_run(&mut out, &mut run, seen_product, true);
                    push_frame(&mut out, &frame);
                    seen_product = true;
                }
                Some(_) => run.push(frame),
                None => {
                    flush_run(&mut out, &mut run, seen_product, false);
                    push_frame(&mut out, &frame);
                    // Headers such as `Caused by:` start a new trace.
                    seen_product = false;
                }
            }
        }
        flush_run(&mut out, &mut run, seen_product, false);

        out
    }

    fn is_product(&self, symbol: &str) -> bool {
        self.namespaces.iter().any(|ns| symbol.starts_with(ns.as_str()))
    }
}

#[derive(Debug)]
struct Frame<'a> {
    // The frame's line plus any location lines attached to it.
    lines: Vec<&'a str>,
    // None for lines that aren't frames.
    symbol: Option<&'a str>,
}

fn parse_frames(raw: &str) -> Vec<Frame<'_>> {
    let mut frames: Vec<Frame<'_>> = Vec::new();
    let mut last_numbered = false;

    for line in raw.lines() {
        if let Some(captures) = NUMBERED_FRAME.captures(line) {
            let symbol = captures.get(1).map(|m| m.as_str());
            frames.push(Frame {
                lines: vec![line],
                symbol,
            });
            last_numbered = true;
            continue;
        }

        if last_numbered && FRAME_LOCATION.is_match(line) && !JVM_FRAME.is_match(line) {
            if let Some(frame) = frames.last_mut() {
                frame.lines.push(line);
                continue;
            }
        }
        last_numbered = false;

        let symbol = JVM_FRAME
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str());
        frames.push(Frame {
            lines: vec![line],
            symbol,
        });
    }

    frames
}

fn push_frame(out: &mut String, frame: &Frame<'_>) {
    for line in &frame.lines {
        out.push_str(line);
        out.push('\n');
    }
}

/// Writes out a run of non-product frames.
///
/// `after_product` is true if product code precedes the run, `before_product` if product code
/// follows it.
fn flush_run(
    out: &mut String,
    run: &mut Vec<Frame<'_>>,
    after_product: bool,
    before_product: bool,
) {
    if run.is_empty() {
        return;
    }

    let keep = if after_product {
        // This run was called from the product frame below it; the first frame re-entered the
        // product frame above.
        Some(0)
    } else if before_product {
        // The innermost run: keep the frame product code called into.
        Some(run.len() - 1)
    } else {
        None
    };

    match keep {
        Some(idx) => {
            let elided = run.len() - 1;
            if idx == 0 {
                push_frame(out, &run[0]);
                push_elided(out, elided);
            } else {
                push_elided(out, elided);
                push_frame(out, &run[idx]);
            }
        }
        None => push_elided(out, run.len()),
    }

    run.clear();
}

fn push_elided(out: &mut String, count: usize) {
    if count > 0 {
        swriteln!(out, "\t... {count} {} elided", plural::frames_str(count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_namespaces_is_identity() {
        let raw = "java.lang.AssertionError\n\tat org.junit.Assert.fail(Assert.java:88)\n";
        assert_eq!(StackTraceFilter::default().filter(raw), raw);
    }

    #[test]
    fn collapses_jvm_frames() {
        let raw = indoc! {"
            java.lang.AssertionError: expected:<1> but was:<2>
            \tat org.junit.Assert.fail(Assert.java:88)
            \tat org.junit.Assert.failNotEquals(Assert.java:834)
            \tat org.junit.Assert.assertEquals(Assert.java:645)
            \tat com.example.FooTest.testBar(FooTest.java:12)
            \tat java.base/jdk.internal.reflect.NativeMethodAccessorImpl.invoke0(Native Method)
            \tat java.base/java.lang.reflect.Method.invoke(Method.java:566)
            \tat org.junit.runners.model.FrameworkMethod$1.runReflectiveCall(FrameworkMethod.java:50)
            \tat com.example.TestBase.run(TestBase.java:40)
            \tat org.junit.runners.ParentRunner.run(ParentRunner.java:363)
            \tat org.junit.runner.JUnitCore.run(JUnitCore.java:137)
        "};

        let filter = StackTraceFilter::new(["com.example."]);
        assert_eq!(
            filter.filter(raw),
            indoc! {"
                java.lang.AssertionError: expected:<1> but was:<2>
                \t... 2 frames elided
                \tat org.junit.Assert.assertEquals(Assert.java:645)
                \tat com.example.FooTest.testBar(FooTest.java:12)
                \tat java.base/jdk.internal.reflect.NativeMethodAccessorImpl.invoke0(Native Method)
                \t... 2 frames elided
                \tat com.example.TestBase.run(TestBase.java:40)
                \tat org.junit.runners.ParentRunner.run(ParentRunner.java:363)
                \t... 1 frame elided
            "}
        );
    }

    #[test]
    fn caused_by_starts_new_trace() {
        let raw = indoc! {"
            java.lang.RuntimeException: outer
            \tat com.example.Foo.a(Foo.java:1)
            Caused by: java.io.IOException: inner
            \tat java.io.File.open(File.java:1)
            \tat java.io.File.read(File.java:2)
        "};

        let filter = StackTraceFilter::new(["com.example."]);
        assert_eq!(
            filter.filter(raw),
            indoc! {"
                java.lang.RuntimeException: outer
                \tat com.example.Foo.a(Foo.java:1)
                Caused by: java.io.IOException: inner
                \t... 2 frames elided
            "}
        );
    }

    #[test]
    fn numbered_frames_keep_locations() {
        let raw = indoc! {"
            thread 'main' panicked at src/lib.rs:3:5:
            boom
            stack backtrace:
               0: std::panicking::begin_panic
                         at /rustc/library/std/src/panicking.rs:1:1
               1: my_crate::check
                         at ./src/lib.rs:3:5
               2: core::ops::function::FnOnce::call_once
                         at /rustc/library/core/src/ops/function.rs:1:1
               3: std::rt::lang_start
        "};

        let filter = StackTraceFilter::new(["my_crate::"]);
        assert_eq!(
            filter.filter(raw),
            indoc! {"
                thread 'main' panicked at src/lib.rs:3:5:
                boom
                stack backtrace:
                   0: std::panicking::begin_panic
                             at /rustc/library/std/src/panicking.rs:1:1
                   1: my_crate::check
                             at ./src/lib.rs:3:5
                   2: core::ops::function::FnOnce::call_once
                             at /rustc/library/core/src/ops/function.rs:1:1
                \t... 1 frame elided
            "}
        );
    }

    #[test]
    fn capture_falls_back_to_stderr() {
        let filter = StackTraceFilter::new(["com.example."]);
        let diagnostics = CapturedDiagnostics::capture(
            &filter,
            None,
            "out".to_owned(),
            "Exception\n\tat com.example.Foo.a(Foo.java:1)\n".to_owned(),
        );
        assert_eq!(diagnostics.raw_stack_trace(), diagnostics.stderr());
        assert_eq!(
            diagnostics.filtered_stack_trace(),
            "Exception\n\tat com.example.Foo.a(Foo.java:1)\n"
        );
    }
}
