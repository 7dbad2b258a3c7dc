// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::ExecutorError, identity::TestIdentity};
use camino::Utf8PathBuf;
use std::process::Stdio;

/// The placeholder replaced by the class name in a command template.
pub const CLASS_PLACEHOLDER: &str = "{class}";

/// The placeholder replaced by the test name in a command template.
pub const TEST_PLACEHOLDER: &str = "{test}";

/// The environment variable holding the class name of the test being run.
pub const CLASS_ENV: &str = "TESTLEDGER_CLASS";

/// The environment variable holding the name of the test being run.
pub const TEST_ENV: &str = "TESTLEDGER_TEST";

/// The environment variable holding the classpath, joined with the platform's path separator.
pub const CLASSPATH_ENV: &str = "TESTLEDGER_CLASSPATH";

/// A command template that runs a single test.
///
/// The template is split into arguments the way a POSIX shell would split it, then `{class}` and
/// `{test}` are substituted inside each argument. Substituted names are never split further.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCommand {
    program: String,
    args: Vec<String>,
    classpath: Vec<Utf8PathBuf>,
}

impl TestCommand {
    /// Parses a command template.
    pub fn parse(template: &str, classpath: Vec<Utf8PathBuf>) -> Result<Self, ExecutorError> {
        let mut words =
            shell_words::split(template).map_err(|error| ExecutorError::CommandParse {
                command: template.to_owned(),
                error,
            })?;
        if words.is_empty() {
            return Err(ExecutorError::EmptyCommand);
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
            classpath,
        })
    }

    /// Creates a command template from already-split arguments.
    pub fn from_args(
        args: impl IntoIterator<Item = impl Into<String>>,
        classpath: Vec<Utf8PathBuf>,
    ) -> Result<Self, ExecutorError> {
        let mut args = args.into_iter().map(Into::into);
        let program = args.next().ok_or(ExecutorError::EmptyCommand)?;
        Ok(Self {
            program,
            args: args.collect(),
            classpath,
        })
    }

    /// Returns the program and arguments for `identity`.
    pub fn argv(&self, identity: &TestIdentity) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|arg| substitute(arg, identity))
            .collect()
    }

    /// Returns the classpath joined with the platform's path separator.
    pub fn joined_classpath(&self) -> String {
        let separator = if cfg!(windows) { ";" } else { ":" };
        self.classpath
            .iter()
            .map(|entry| entry.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }

    pub(super) fn to_command(&self, identity: &TestIdentity) -> tokio::process::Command {
        let mut argv = self.argv(identity).into_iter();
        // argv always has at least the program.
        let program = argv.next().unwrap_or_default();
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(argv)
            .env(CLASS_ENV, identity.class_name())
            .env(TEST_ENV, identity.test_name())
            .env(CLASSPATH_ENV, self.joined_classpath())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn substitute(arg: &str, identity: &TestIdentity) -> String {
    // One pass: substituted names are never rescanned for placeholders.
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(idx) = rest.find('{') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if let Some(after) = tail.strip_prefix(CLASS_PLACEHOLDER) {
            out.push_str(identity.class_name());
            rest = after;
        } else if let Some(after) = tail.strip_prefix(TEST_PLACEHOLDER) {
            out.push_str(identity.test_name());
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn substitutes_placeholders() {
        let command = TestCommand::parse(
            "java -cp lib.jar Runner --test '{class}#{test}' {x}",
            Vec::new(),
        )
        .unwrap();
        let identity = TestIdentity::new("com.example.{test}", "a b").unwrap();
        assert_eq!(
            command.argv(&identity),
            vec![
                "java",
                "-cp",
                "lib.jar",
                "Runner",
                "--test",
                "com.example.{test}#a b",
                "{x}",
            ]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            TestCommand::parse("   ", Vec::new()),
            Err(ExecutorError::EmptyCommand)
        ));
        assert!(matches!(
            TestCommand::parse("sh -c 'unterminated", Vec::new()),
            Err(ExecutorError::CommandParse { .. })
        ));
        assert!(matches!(
            TestCommand::from_args(Vec::<String>::new(), Vec::new()),
            Err(ExecutorError::EmptyCommand)
        ));
    }

    #[test]
    fn classpath_is_joined() {
        let command = TestCommand::from_args(
            ["run"],
            vec![Utf8PathBuf::from("a.jar"), Utf8PathBuf::from("lib/b.jar")],
        )
        .unwrap();
        let expected = if cfg!(windows) {
            "a.jar;lib/b.jar"
        } else {
            "a.jar:lib/b.jar"
        };
        assert_eq!(command.joined_classpath(), expected);
    }
}
