//! Table, column and schema-object metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// 1-based position in the primary key, if the column is part of it.
    pub pk_ordinal: Option<u32>,

    /// Data type (e.g. "int", "varchar").
    pub data_type: String,

    /// Full column type (e.g. "int unsigned", "varchar(255)").
    pub column_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            pk_ordinal: None,
            column_type: data_type.clone(),
            data_type,
        }
    }

    /// Mark the column as the `ordinal`-th primary key column.
    pub fn with_pk(mut self, ordinal: u32) -> Self {
        self.pk_ordinal = Some(ordinal);
        self
    }
}

/// Table metadata, read-only once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    /// Indexes into `columns`, in primary key order.
    primary_key: Vec<usize>,
}

impl TableSchema {
    /// Build a table, checking that primary key ordinals run 1..=n without gaps.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();

        let mut keyed: Vec<(u32, usize)> = columns
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| c.pk_ordinal.map(|ordinal| (ordinal, idx)))
            .collect();
        keyed.sort_unstable();

        for (expected, (ordinal, idx)) in (1u32..).zip(&keyed) {
            if *ordinal != expected {
                return Err(MigrateError::integrity(format!(
                    "table {}: primary key column {} has ordinal {}, expected {}",
                    name, columns[*idx].name, ordinal, expected
                )));
            }
        }

        Ok(Self {
            primary_key: keyed.into_iter().map(|(_, idx)| idx).collect(),
            name,
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Primary key columns in key order.
    pub fn primary_key(&self) -> impl Iterator<Item = &Column> + '_ {
        self.primary_key.iter().map(move |&idx| &self.columns[idx])
    }

    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key().map(|c| c.name.clone()).collect()
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn key_width(&self) -> usize {
        self.primary_key.len()
    }
}

/// Kind of schema object copied by the schema copier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Table,
    View,
    Function,
    Procedure,
    Trigger,
}

impl ObjectKind {
    /// Replay order: tables first so views, routines and triggers can refer to them.
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Table,
        ObjectKind::View,
        ObjectKind::Function,
        ObjectKind::Procedure,
        ObjectKind::Trigger,
    ];

    /// SQL keyword used in `SHOW CREATE` and `DROP ... IF EXISTS`.
    pub fn keyword(&self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Procedure => "PROCEDURE",
            ObjectKind::Trigger => "TRIGGER",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keyword().to_lowercase())
    }
}

/// A named schema object in the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub name: String,
}

impl SchemaObject {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Default character set and collation of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDefaults {
    pub character_set: String,
    pub collation: String,
}
