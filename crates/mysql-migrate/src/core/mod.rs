//! Core abstractions shared by every pipeline stage.
//!
//! - [`schema`]: table, column and schema-object metadata
//! - [`value`]: SQL values, row batches and parameterized statements
//! - [`command`]: read and insert commands flowing through the pipeline
//! - [`traits`]: database capabilities implemented by the drivers

pub mod command;
pub mod schema;
pub mod traits;
pub mod value;

pub use command::{InsertCommand, ReadCommand};
pub use schema::{Column, DatabaseDefaults, ObjectKind, SchemaObject, TableSchema};
pub use traits::{InsertSession, SchemaSource, SchemaTarget, SourceReader, TargetWriter};
pub use value::{Batch, Row, SqlValue, Statement};
