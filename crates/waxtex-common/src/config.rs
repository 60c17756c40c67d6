//! Configuration structures for waxtex.
//!
//! This module defines:
//! - [`RuntimeConfig`]: host-level settings, loadable from a TOML file
//! - [`CompileOptions`]: per-call overrides for a single compile job
//! - [`FormatOptions`]: per-call settings for format generation

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;

/// Host-level runtime configuration.
///
/// Set once when the runtime is initialized; per-call options can override
/// the directories for individual jobs.
///
/// # Example
///
/// ```toml
/// bundle_dir = "/var/lib/waxtex/bundle"
/// fonts_dir = "/usr/share/fonts"
/// module_cache_dir = "/var/cache/waxtex"
/// epoch_tick_ms = 10
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Default support-data bundle directory for all jobs.
    #[serde(default)]
    pub bundle_dir: Option<PathBuf>,

    /// Default fonts directory for all jobs.
    ///
    /// When neither this nor the per-call override is set, each job gets a
    /// fresh empty fonts directory inside its working tree.
    #[serde(default)]
    pub fonts_dir: Option<PathBuf>,

    /// Directory for cached AOT-compiled engine modules.
    ///
    /// When set, the precompiled module is serialized to
    /// `{content_hash}.cwasm` in this directory and reused on the next
    /// initialization, skipping the expensive compile step.
    #[serde(default)]
    pub module_cache_dir: Option<PathBuf>,

    /// Interval of the engine epoch ticker in milliseconds.
    ///
    /// The tick bounds how quickly a cancelled job's sandbox call can be
    /// preempted.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bundle_dir: None,
            fonts_dir: None,
            module_cache_dir: None,
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RuntimeError::io(
                format!("reading config file '{}'", path.as_ref().display()),
                e,
            )
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, RuntimeError> {
        toml::from_str(content)
            .map_err(|e| RuntimeError::config(format!("parsing config: {e}")))
    }

    /// Set the default bundle directory.
    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = Some(dir.into());
        self
    }

    /// Set the default fonts directory.
    pub fn with_fonts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fonts_dir = Some(dir.into());
        self
    }

    /// Set the AOT module cache directory.
    pub fn with_module_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_cache_dir = Some(dir.into());
        self
    }
}

/// A sink for the engine's diagnostic output.
pub type LogSink = Box<dyn Write + Send>;

/// Per-call options for a single compile job.
#[derive(Default)]
pub struct CompileOptions {
    /// Bundle directory override for this job.
    pub bundle_dir: Option<PathBuf>,

    /// Fonts directory override for this job.
    pub fonts_dir: Option<PathBuf>,

    /// Receives the diagnostic text captured from the engine's stderr,
    /// on success and on every failure path.
    pub log_sink: Option<LogSink>,

    /// Cancellation token for this job, observed at the sandbox boundary.
    pub cancel: Option<CancellationToken>,
}

impl CompileOptions {
    /// Create empty options (all runtime defaults apply).
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the bundle directory for this job.
    pub fn bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = Some(dir.into());
        self
    }

    /// Override the fonts directory for this job.
    pub fn fonts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fonts_dir = Some(dir.into());
        self
    }

    /// Receive the engine's diagnostic output in the given sink.
    pub fn log_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.log_sink = Some(Box::new(sink));
        self
    }

    /// Attach a cancellation token to this job.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("bundle_dir", &self.bundle_dir)
            .field("fonts_dir", &self.fonts_dir)
            .field("log_sink", &self.log_sink.as_ref().map(|_| ".."))
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Per-call options for format generation.
#[derive(Default)]
pub struct FormatOptions {
    /// Receives the diagnostic text captured from the engine's stderr.
    pub log_sink: Option<LogSink>,

    /// Cancellation token for this job, observed at the sandbox boundary.
    pub cancel: Option<CancellationToken>,
}

impl FormatOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive the engine's diagnostic output in the given sink.
    pub fn log_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.log_sink = Some(Box::new(sink));
        self
    }

    /// Attach a cancellation token to this run.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl std::fmt::Debug for FormatOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatOptions")
            .field("log_sink", &self.log_sink.as_ref().map(|_| ".."))
            .field("cancel", &self.cancel)
            .finish()
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn epoch_tick_ms() -> u64 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(config.bundle_dir.is_none());
        assert!(config.fonts_dir.is_none());
        assert!(config.module_cache_dir.is_none());
        assert_eq!(config.epoch_tick_ms, 10);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            bundle_dir = "/srv/bundle"
        "#;

        let config = RuntimeConfig::from_toml(toml).unwrap();

        assert_eq!(config.bundle_dir, Some(PathBuf::from("/srv/bundle")));
        // Defaults applied
        assert_eq!(config.epoch_tick_ms, 10);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            bundle_dir = "/srv/bundle"
            fonts_dir = "/usr/share/fonts"
            module_cache_dir = "/var/cache/waxtex"
            epoch_tick_ms = 25
        "#;

        let config = RuntimeConfig::from_toml(toml).unwrap();

        assert_eq!(config.fonts_dir, Some(PathBuf::from("/usr/share/fonts")));
        assert_eq!(
            config.module_cache_dir,
            Some(PathBuf::from("/var/cache/waxtex"))
        );
        assert_eq!(config.epoch_tick_ms, 25);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = RuntimeConfig::from_toml("this is not valid toml [");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = RuntimeConfig::default().with_bundle_dir("/srv/bundle");
        let text = toml::to_string(&config).unwrap();
        let parsed = RuntimeConfig::from_toml(&text).unwrap();

        assert_eq!(parsed.bundle_dir, config.bundle_dir);
        assert_eq!(parsed.epoch_tick_ms, config.epoch_tick_ms);
    }

    #[test]
    fn test_compile_options_builder() {
        let opts = CompileOptions::new()
            .bundle_dir("/srv/bundle")
            .fonts_dir("/srv/fonts")
            .cancel(CancellationToken::new());

        assert_eq!(opts.bundle_dir, Some(PathBuf::from("/srv/bundle")));
        assert_eq!(opts.fonts_dir, Some(PathBuf::from("/srv/fonts")));
        assert!(opts.cancel.is_some());
        assert!(opts.log_sink.is_none());
    }

    #[test]
    fn test_compile_options_log_sink() {
        let opts = CompileOptions::new().log_sink(Vec::new());
        assert!(opts.log_sink.is_some());
        // Debug must not try to print the sink itself
        assert!(format!("{opts:?}").contains("log_sink"));
    }
}
