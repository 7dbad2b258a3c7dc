// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestThreads;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind, FixtureMissingError},
    run_mode::RunMode,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, sync::LazyLock, time::Duration};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
#[inline]
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Trait for handling configuration warnings.
///
/// This allows warnings to be logged (the default) or collected in tests.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        workspace_root: &Utf8Path,
        unknown: &BTreeSet<String>,
    );
}

/// Default implementation of [`ConfigWarnings`] that logs warnings using the tracing crate.
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        workspace_root: &Utf8Path,
        unknown: &BTreeSet<String>,
    ) {
        let mut unknown_str = String::new();
        if unknown.len() == 1 {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.extend(unknown.iter().map(String::as_str));
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!(
            "in config file {}, ignoring unknown configuration {unknown_str}",
            config_file
                .strip_prefix(workspace_root)
                .unwrap_or(config_file),
        )
    }
}

/// Settings read from the environment.
#[derive(Clone, Debug, Default)]
pub struct EnvOverrides {
    /// The value of `TESTLEDGER_REPORT_DIR`.
    pub report_dir: Option<String>,

    /// The value of `TESTLEDGER_MODE`.
    pub mode: Option<String>,
}

impl EnvOverrides {
    /// The environment variable for the report directory.
    pub const REPORT_DIR_VAR: &'static str = "TESTLEDGER_REPORT_DIR";

    /// The environment variable for the run mode.
    pub const MODE_VAR: &'static str = "TESTLEDGER_MODE";

    /// Reads overrides from the process environment. Empty values count as unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        Self {
            report_dir: var(Self::REPORT_DIR_VAR),
            mode: var(Self::MODE_VAR),
        }
    }
}

/// Settings passed on the command line. These take precedence over every other source.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Overrides `report-dir`.
    pub report_dir: Option<Utf8PathBuf>,

    /// Overrides `mode`.
    pub mode: Option<RunMode>,

    /// Overrides `test-threads`.
    pub test_threads: Option<TestThreads>,

    /// Overrides `fail-fast`.
    pub fail_fast: Option<bool>,
}

/// The report directory and run mode, present only when the tracker is enabled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackerSettings {
    /// The report root, resolved against the working root.
    pub report_dir: Utf8PathBuf,

    /// The run mode.
    pub mode: RunMode,
}

/// Overall configuration for testledger.
#[derive(Clone, Debug)]
pub struct TestledgerConfig {
    workspace_root: Utf8PathBuf,
    config_file: Utf8PathBuf,
    inner: TestledgerConfigDeserialize,
}

impl TestledgerConfig {
    /// The default location of the config within the working root: `.config/testledger.toml`.
    pub const CONFIG_PATH: &'static str = ".config/testledger.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the configuration for `workspace_root`.
    ///
    /// If `config_file` is `None`, `.config/testledger.toml` is read if it exists. An explicit
    /// config file must exist.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        env: &EnvOverrides,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config()
            .add_source(source)
            .set_override_option("report-dir", env.report_dir.clone())
            .and_then(|builder| builder.set_override_option("mode", env.mode.clone()))
            .map_err(|error| {
                ConfigParseError::new(&config_file, ConfigParseErrorKind::BuildError(Box::new(error)))
            })?;

        let (inner, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &workspace_root, &unknown);
        }

        Ok(Self {
            workspace_root,
            config_file,
            inner,
        })
    }

    /// Applies command-line overrides.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(report_dir) = overrides.report_dir {
            self.inner.report_dir = Some(report_dir);
        }
        if let Some(mode) = overrides.mode {
            self.inner.mode = Some(mode);
        }
        if let Some(test_threads) = overrides.test_threads {
            self.inner.test_threads = Some(test_threads);
        }
        if let Some(fail_fast) = overrides.fail_fast {
            self.inner.fail_fast = fail_fast;
        }
    }

    /// Returns the working root that relative paths are resolved against.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the config file that was read (or would have been read, if it doesn't exist).
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the report directory and run mode, or `None` if either is unset. In that case
    /// the tracker is disabled.
    pub fn tracker(&self) -> Option<TrackerSettings> {
        match (&self.inner.report_dir, self.inner.mode) {
            (Some(report_dir), Some(mode)) => Some(TrackerSettings {
                report_dir: self.resolve(report_dir),
                mode,
            }),
            _ => None,
        }
    }

    /// Returns the configured report directory, whether or not the tracker is enabled.
    pub fn report_dir(&self) -> Option<Utf8PathBuf> {
        self.inner.report_dir.as_deref().map(|dir| self.resolve(dir))
    }

    /// Returns the configured run mode, whether or not the tracker is enabled.
    pub fn mode(&self) -> Option<RunMode> {
        self.inner.mode
    }

    /// Returns the configured test-threads value, if any.
    pub fn configured_test_threads(&self) -> Option<TestThreads> {
        self.inner.test_threads
    }

    /// Returns the number of tests to run simultaneously.
    pub fn test_threads(&self) -> usize {
        match self.inner.test_threads {
            Some(test_threads) => test_threads.compute(),
            None => TestThreads::default_for(get_num_cpus(), self.inner.large_machine_threshold),
        }
    }

    /// Returns the CPU count at which the default thread count is halved.
    pub fn large_machine_threshold(&self) -> usize {
        self.inner.large_machine_threshold
    }

    /// Returns how often the HTML report reloads itself.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.inner.refresh_seconds)
    }

    /// Returns the namespaces that identify product code in stack traces.
    pub fn product_namespaces(&self) -> &[String] {
        &self.inner.product_namespaces
    }

    /// Returns true if scheduling should stop after the first failure.
    pub fn fail_fast(&self) -> bool {
        self.inner.fail_fast
    }

    /// Returns the period after which running tests are reported as possibly hung.
    pub fn hang_timeout(&self) -> Duration {
        self.inner.hang_timeout
    }

    /// Returns the file touched after each finished test, if configured.
    pub fn timestamp_file(&self) -> Option<Utf8PathBuf> {
        self.inner.timestamp_file.as_deref().map(|file| self.resolve(file))
    }

    /// Returns the classpath entries handed to test commands.
    pub fn classpath(&self) -> Vec<Utf8PathBuf> {
        self.inner
            .classpath
            .iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    /// Returns the fixture paths that must exist before a run.
    pub fn fixtures(&self) -> Vec<Utf8PathBuf> {
        self.inner
            .fixtures
            .iter()
            .map(|fixture| self.resolve(fixture))
            .collect()
    }

    /// Returns the exit code with which a test command reports a skipped test.
    pub fn skip_exit_code(&self) -> i32 {
        self.inner.skip_exit_code
    }

    /// Checks that every configured fixture exists.
    pub fn check_fixtures(&self) -> Result<(), FixtureMissingError> {
        match self.fixtures().into_iter().find(|fixture| !fixture.exists()) {
            Some(missing) => Err(FixtureMissingError::new(missing)),
            None => Ok(()),
        }
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        // join returns `path` unchanged if it is absolute.
        self.workspace_root.join(path)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(TestledgerConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: TestledgerConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // Both serde_path_to_error and the config crate report the key. Drop the key
                // from the config error for consistency.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TestledgerConfigDeserialize {
    #[serde(default)]
    report_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    mode: Option<RunMode>,
    #[serde(default)]
    test_threads: Option<TestThreads>,
    large_machine_threshold: usize,
    refresh_seconds: u64,
    product_namespaces: Vec<String>,
    fail_fast: bool,
    #[serde(with = "humantime_serde")]
    hang_timeout: Duration,
    #[serde(default)]
    timestamp_file: Option<Utf8PathBuf>,
    classpath: Vec<Utf8PathBuf>,
    fixtures: Vec<Utf8PathBuf>,
    skip_exit_code: i32,
}
