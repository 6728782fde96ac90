//! Configuration validation.

use mysql_async::Opts;
use regex::Regex;

use super::{Config, ConnectionConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("destination", &config.destination)?;

    let migration = &config.migration;
    if migration.read_concurrency == 0 {
        return Err(MigrateError::Config(
            "migration.read_concurrency must be at least 1".into(),
        ));
    }
    if migration.insert_concurrency == 0 {
        return Err(MigrateError::Config(
            "migration.insert_concurrency must be at least 1".into(),
        ));
    }
    if migration.read_batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.read_batch_size must be at least 1".into(),
        ));
    }
    if migration.job_timeout_minutes == 0 {
        return Err(MigrateError::Config(
            "migration.job_timeout_minutes must be greater than 0".into(),
        ));
    }
    for (name, seconds) in [
        ("read_timeout_seconds", migration.read_timeout_seconds),
        ("insert_timeout_seconds", migration.insert_timeout_seconds),
        ("schema_timeout_seconds", migration.schema_timeout_seconds),
    ] {
        if seconds == 0 {
            return Err(MigrateError::Config(format!(
                "migration.{} must be greater than 0",
                name
            )));
        }
    }

    for pattern in &migration.include_tables {
        check_pattern("migration.include_tables", pattern)?;
    }
    for pattern in &migration.exclude_tables {
        check_pattern("migration.exclude_tables", pattern)?;
    }
    for entry in &migration.limit_overrides {
        check_pattern("migration.limit_overrides", &entry.pattern)?;
    }
    for entry in &migration.skip_columns {
        check_pattern("migration.skip_columns", &entry.pattern)?;
    }

    for (realm, settings) in [
        ("source", &config.resilience.source),
        ("destination", &config.resilience.destination),
    ] {
        if settings.breaker_failures == 0 {
            return Err(MigrateError::Config(format!(
                "resilience.{}.breaker_failures must be at least 1",
                realm
            )));
        }
    }

    Ok(())
}

fn validate_connection(name: &str, connection: &ConnectionConfig) -> Result<()> {
    if connection.url.trim().is_empty() {
        return Err(MigrateError::Config(format!("{}.url is required", name)));
    }
    let opts = Opts::from_url(&connection.url)?;
    match opts.db_name() {
        Some(db) if !db.is_empty() => Ok(()),
        _ => Err(MigrateError::Config(format!(
            "{}.url must name a database",
            name
        ))),
    }
}

fn check_pattern(key: &str, pattern: &str) -> Result<()> {
    Regex::new(pattern).map(|_| ()).map_err(|e| {
        MigrateError::Config(format!("{}: invalid pattern '{}': {}", key, pattern, e))
    })
}
