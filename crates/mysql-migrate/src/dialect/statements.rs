//! Statement text for reading key ranges, probing range boundaries and
//! inserting batches.

use super::lexical::{lexicographic, Bound};
use super::quote_ident;
use crate::error::{MigrateError, Result};

/// Placeholder names used by [`range_select_sql`].
pub struct RangeParams;

impl RangeParams {
    pub fn from(idx: usize) -> String {
        format!("from_{}", idx)
    }

    pub fn to(idx: usize) -> String {
        format!("to_{}", idx)
    }
}

/// Placeholder names used by [`probe_sql`].
pub struct ProbeParams;

impl ProbeParams {
    pub const BATCH_SIZE: &'static str = "batchSize";

    pub fn key(idx: usize) -> String {
        format!("p{}", idx)
    }
}

fn column_list<C: AsRef<str>>(columns: &[C], separator: &str) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Select `columns` of `table`, restricted to a key range when bounds are given.
///
/// The lower bound binds `@from_0..`, the upper bound `@to_0..`. An upper
/// bound without a lower bound is rejected.
pub fn range_select_sql<C, K>(
    table: &str,
    columns: &[C],
    key_columns: &[K],
    has_from: bool,
    has_to: bool,
) -> Result<String>
where
    C: AsRef<str>,
    K: AsRef<str>,
{
    let mut sql = format!(
        "select {} from {}",
        column_list(columns, ","),
        quote_ident(table)
    );

    match (has_from, has_to) {
        (false, false) => {}
        (true, to) => {
            let from_params: Vec<String> = (0..key_columns.len()).map(RangeParams::from).collect();
            sql.push_str(&format!(
                " where ({})",
                lexicographic(key_columns, &from_params, Bound::Lower)?
            ));
            if to {
                let to_params: Vec<String> = (0..key_columns.len()).map(RangeParams::to).collect();
                sql.push_str(&format!(
                    " and ({})",
                    lexicographic(key_columns, &to_params, Bound::Upper)?
                ));
            }
        }
        (false, true) => {
            return Err(MigrateError::integrity(format!(
                "range read of {} has an upper bound but no lower bound",
                table
            )))
        }
    }

    Ok(sql)
}

/// Two-point probe locating the next key range of `table`.
///
/// Returns the key of the first row at or after `@p0..` tagged with
/// ordinal 1, and the key of the row `@batchSize` positions further tagged
/// with ordinal 2. The ordinal is the last column of each result row.
pub fn probe_sql<K: AsRef<str>>(table: &str, key_columns: &[K], has_from: bool) -> Result<String> {
    if key_columns.is_empty() {
        return Err(MigrateError::integrity(format!(
            "cannot probe key ranges of {} without a primary key",
            table
        )));
    }

    let keys = column_list(key_columns, ", ");
    let where_clause = if has_from {
        let params: Vec<String> = (0..key_columns.len()).map(ProbeParams::key).collect();
        format!(" where {}", lexicographic(key_columns, &params, Bound::Lower)?)
    } else {
        String::new()
    };
    let table = quote_ident(table);

    Ok(format!(
        "(select {keys}, 1 as ordinal from {table}{filter} order by {keys} limit 1) \
         union \
         (select {keys}, 2 as ordinal from {table}{filter} order by {keys} limit @{batch}, 1)",
        keys = keys,
        table = table,
        filter = where_clause,
        batch = ProbeParams::BATCH_SIZE,
    ))
}

/// Placeholder name of the `idx`-th (1-based, row-major) insert value.
pub fn insert_param(idx: usize) -> String {
    format!("p{}", idx)
}

/// Multi-row insert with row-major placeholders `@p1..@p{columns * rows}`.
pub fn insert_sql<C: AsRef<str>>(
    table: &str,
    columns: &[C],
    row_count: usize,
    insert_ignore: bool,
) -> String {
    let width = columns.len();
    let rows = (0..row_count)
        .map(|row| {
            let values = (1..=width)
                .map(|col| format!("@{}", insert_param(row * width + col)))
                .collect::<Vec<_>>()
                .join(",");
            format!("({})", values)
        })
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "insert {}into {} ({}) values {}",
        if insert_ignore { "ignore " } else { "" },
        quote_ident(table),
        column_list(columns, ","),
        rows
    )
}
