//! Binding of `@name` placeholders to positional `?` parameters.
//!
//! Placeholders inside quoted identifiers and string literals are left
//! alone, as are `@@` system variables. A name may appear more than once;
//! each occurrence binds its own copy of the value. If a name is bound
//! twice the first binding wins.

use std::collections::HashMap;

use mysql_async::{Params, Value};

use crate::core::Statement;
use crate::error::{MigrateError, Result};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite `statement` into driver form: SQL with `?` markers and the
/// values in marker order.
pub fn to_positional(statement: &Statement) -> Result<(String, Params)> {
    let sql = &statement.sql;
    let mut bound: HashMap<&str, &Value> = HashMap::with_capacity(statement.params.len());
    for (name, value) in &statement.params {
        bound.entry(name.as_str()).or_insert(value);
    }
    let mut out = String::with_capacity(sql.len());
    let mut values: Vec<Value> = Vec::with_capacity(statement.params.len());
    let mut state = Scan::Code;
    let mut chars = sql.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match state {
            Scan::Quoted(quote) => {
                out.push(c);
                if c == '\\' && quote != '`' {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote {
                    // A doubled quote stays inside the literal.
                    if matches!(chars.peek(), Some((_, next)) if *next == quote) {
                        if let Some((_, next)) = chars.next() {
                            out.push(next);
                        }
                    } else {
                        state = Scan::Code;
                    }
                }
            }
            Scan::Code => match c {
                '`' | '\'' | '"' => {
                    out.push(c);
                    state = Scan::Quoted(c);
                }
                '@' if matches!(chars.peek(), Some((_, '@'))) => {
                    out.push_str("@@");
                    chars.next();
                    while let Some((_, n)) = chars.peek().copied().filter(|(_, n)| is_name_char(*n)) {
                        out.push(n);
                        chars.next();
                    }
                }
                '@' if matches!(chars.peek(), Some((_, n)) if is_name_char(*n)) => {
                    let start = idx + 1;
                    let mut end = start;
                    while let Some((i, n)) = chars.peek().copied() {
                        if !is_name_char(n) {
                            break;
                        }
                        end = i + n.len_utf8();
                        chars.next();
                    }
                    let name = &sql[start..end];
                    let value = bound.get(name).ok_or_else(|| {
                        MigrateError::integrity(format!("no value bound for parameter @{}", name))
                    })?;
                    values.push((*value).clone());
                    out.push('?');
                }
                _ => out.push(c),
            },
        }
    }

    let params = if values.is_empty() {
        Params::Empty
    } else {
        Params::Positional(values)
    };
    Ok((out, params))
}
