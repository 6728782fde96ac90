//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB for both the source and the destination
//!
//! A driver implements the capability traits in [`crate::core::traits`];
//! nothing outside this module depends on a concrete driver except the
//! orchestrator, which wires them up.

pub mod mysql;

pub use mysql::{MysqlReader, MysqlWriter};
