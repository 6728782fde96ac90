//! Configuration loading and validation.
//!
//! Settings are layered, lowest precedence first: an optional YAML file,
//! `MYSQL_MIGRATE__*` environment variables (`__` separates nesting levels,
//! e.g. `MYSQL_MIGRATE__MIGRATION__READ_CONCURRENCY=4`), then explicit
//! overrides supplied by the caller.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use ::config::{Environment, File, FileFormat};

use crate::error::Result;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MYSQL_MIGRATE";

/// Keys whose environment values are split on commas.
const LIST_KEYS: &[&str] = &["migration.include_tables", "migration.exclude_tables"];

/// Highest-precedence settings, keyed by dotted path (`migration.limit`).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    entries: Vec<(String, ::config::Value)>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing an earlier override of the same key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<::config::Value>) -> Self {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value.into()));
        self
    }

    /// Set `key` only when a value is given.
    pub fn set_opt<V: Into<::config::Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Config {
    /// Assemble, deserialize and validate the layered configuration.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        builder = builder.add_source(environment());
        for (key, value) in &overrides.entries {
            builder = builder.set_override(key.as_str(), value.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment layering.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = ::config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Copy of the configuration safe to print or log.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.source.url = self.source.redacted_url();
        copy.destination.url = self.destination.redacted_url();
        copy
    }
}

fn environment() -> Environment {
    let mut env = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",");
    for key in LIST_KEYS {
        env = env.with_list_parse_key(key);
    }
    env
}
