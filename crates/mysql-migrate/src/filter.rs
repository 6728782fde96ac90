//! Table selection, column projection and row caps driven by name patterns.
//!
//! All patterns are unanchored regular expressions: `orders` matches
//! `orders_archive` too. Anchor with `^...$` for an exact name.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;

use crate::config::MigrationConfig;
use crate::core::{Column, TableSchema};
use crate::error::Result;

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Into::into))
        .collect()
}

/// Decides which tables take part in the migration.
///
/// A table is copied when it matches any include pattern, or when it
/// matches no exclude pattern. Include patterns therefore only rescue
/// tables an exclude pattern would drop; they never narrow the set.
#[derive(Debug, Clone)]
pub struct TableFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl TableFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn matches(&self, table: &str) -> bool {
        self.include.iter().any(|r| r.is_match(table))
            || !self.exclude.iter().any(|r| r.is_match(table))
    }
}

/// Per-table lists of columns to leave out of the read projection.
#[derive(Debug, Clone, Default)]
pub struct ColumnSkipRules {
    rules: Vec<(Regex, Vec<String>)>,
}

impl ColumnSkipRules {
    pub fn new<'a>(rules: impl IntoIterator<Item = (&'a str, &'a [String])>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|(pattern, columns)| Ok((Regex::new(pattern)?, columns.to_vec())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Column names skipped for `table`, collected from every matching rule.
    pub fn skipped(&self, table: &str) -> HashSet<&str> {
        self.rules
            .iter()
            .filter(|(pattern, _)| pattern.is_match(table))
            .flat_map(|(_, columns)| columns.iter().map(String::as_str))
            .collect()
    }

    /// The table's columns minus the skipped ones, in table order.
    pub fn projection(&self, table: &TableSchema) -> Arc<[Column]> {
        let skipped = self.skipped(table.name());
        table
            .columns()
            .iter()
            .filter(|c| !skipped.contains(c.name.as_str()))
            .cloned()
            .collect()
    }
}

/// Row caps: the first matching override wins, then the global cap.
#[derive(Debug, Clone, Default)]
pub struct RowLimits {
    global: Option<u64>,
    overrides: Vec<(Regex, u64)>,
}

impl RowLimits {
    pub fn new<'a>(global: Option<u64>, overrides: impl IntoIterator<Item = (&'a str, u64)>) -> Result<Self> {
        let overrides = overrides
            .into_iter()
            .map(|(pattern, limit)| Ok((Regex::new(pattern)?, limit)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { global, overrides })
    }

    pub fn limit_for(&self, table: &str) -> Option<u64> {
        self.overrides
            .iter()
            .find(|(pattern, _)| pattern.is_match(table))
            .map(|(_, limit)| *limit)
            .or(self.global)
    }
}

/// Every pattern-driven rule of a migration, compiled once.
#[derive(Debug, Clone)]
pub struct Rules {
    pub tables: TableFilter,
    pub skip_columns: ColumnSkipRules,
    pub limits: RowLimits,
}

impl Rules {
    pub fn from_config(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            tables: TableFilter::new(&config.include_tables, &config.exclude_tables)?,
            skip_columns: ColumnSkipRules::new(
                config
                    .skip_columns
                    .iter()
                    .map(|s| (s.pattern.as_str(), s.columns.as_slice())),
            )?,
            limits: RowLimits::new(
                config.limit,
                config
                    .limit_overrides
                    .iter()
                    .map(|o| (o.pattern.as_str(), o.limit)),
            )?,
        })
    }
}
