//! Precedence resolution for client preferences.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. config.kdl (see [`super::config_path`])
//! 3. Built-in defaults

use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use crate::{Error, Result};
use crate::config::schema::{ClientConfig, OutputFormat};
use crate::resolver::DEFAULT_INSTANCE;
use crate::session::RetryPolicy;
use crate::session::retry::{DEFAULT_ATTEMPTS, DEFAULT_DELAY};

/// Timeout applied to identity API requests when nothing else is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from a config file
    File(String),
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::File(path) => write!(f, "file:{}", path),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub retry_attempts: Resolved<u32>,
    pub retry_delay_secs: Resolved<u64>,
    pub timeout_secs: Resolved<u64>,
    pub default_instance: Resolved<String>,
    pub output_format: Resolved<OutputFormat>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            retry_attempts: Resolved::new(DEFAULT_ATTEMPTS, ValueSource::Default),
            retry_delay_secs: Resolved::new(DEFAULT_DELAY.as_secs(), ValueSource::Default),
            timeout_secs: Resolved::new(DEFAULT_TIMEOUT_SECS, ValueSource::Default),
            default_instance: Resolved::new(DEFAULT_INSTANCE.to_string(), ValueSource::Default),
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn default_instance(&self) -> &str {
        &self.default_instance.value
    }

    /// Retry policy built from the resolved attempts and delay.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts.value,
            Duration::from_secs(self.retry_delay_secs.value),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.value)
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub retry_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub default_instance: Option<String>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn with_retry_delay_secs(mut self, secs: u64) -> Self {
        self.retry_delay_secs = Some(secs);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_default_instance(mut self, instance: impl Into<String>) -> Self {
        self.default_instance = Some(instance.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Check flag values against the same rules as config.kdl.
    pub fn validate(&self) -> std::result::Result<(), String> {
        ClientConfig {
            retry_attempts: self.retry_attempts,
            retry_delay_secs: self.retry_delay_secs,
            timeout_secs: self.timeout_secs,
            default_instance: self.default_instance.clone(),
            output_format: self.output_format,
        }
        .validate()
    }
}

/// Pick the highest-precedence value among CLI flag, file and default.
fn pick<T: Clone>(
    cli: Option<&T>,
    file: Option<&T>,
    file_source: &ValueSource,
    current: &mut Resolved<T>,
) {
    if let Some(value) = cli {
        *current = Resolved::new(value.clone(), ValueSource::CliFlag);
    } else if let Some(value) = file {
        *current = Resolved::new(value.clone(), file_source.clone());
    }
}

/// Resolve configuration from `config_dir` and CLI `overrides`.
///
/// A missing config file is not an error; an unreadable or unparsable one is,
/// and so is an override that config.kdl would reject.
pub fn resolve_config(config_dir: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    overrides.validate().map_err(Error::InvalidInput)?;
    let path = config_dir.join(super::CONFIG_FILE_NAME);
    let file = super::read_config(&path)?;
    Ok(merge_config(&file, &ValueSource::File(path.display().to_string()), overrides))
}

/// Layer `overrides` over `file` over the defaults.
pub fn merge_config(
    file: &ClientConfig,
    file_source: &ValueSource,
    overrides: &ConfigOverrides,
) -> ResolvedConfig {
    let mut result = ResolvedConfig::default();

    pick(
        overrides.retry_attempts.as_ref(),
        file.retry_attempts.as_ref(),
        file_source,
        &mut result.retry_attempts,
    );
    pick(
        overrides.retry_delay_secs.as_ref(),
        file.retry_delay_secs.as_ref(),
        file_source,
        &mut result.retry_delay_secs,
    );
    pick(
        overrides.timeout_secs.as_ref(),
        file.timeout_secs.as_ref(),
        file_source,
        &mut result.timeout_secs,
    );
    pick(
        overrides.default_instance.as_ref(),
        file.default_instance.as_ref(),
        file_source,
        &mut result.default_instance,
    );
    pick(
        overrides.output_format.as_ref(),
        file.output_format.as_ref(),
        file_source,
        &mut result.output_format,
    );

    result
}
