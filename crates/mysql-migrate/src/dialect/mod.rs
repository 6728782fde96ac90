//! MySQL SQL generation.
//!
//! - [`lexical`]: tuple-order comparison predicates over composite keys
//! - [`statements`]: range selects, key-range probes and multi-row inserts
//!
//! Everything here is pure string building. Values never appear in the
//! generated text; they are referenced through `@name` placeholders and
//! bound by the driver.

pub mod lexical;
pub mod statements;

pub use lexical::{lexicographic, Bound};
pub use statements::{
    insert_param, insert_sql, probe_sql, range_select_sql, ProbeParams, RangeParams,
};

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal, escaping backslashes and single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}
