//! Lexicographic comparison of a row's key against a parameter tuple.

use super::quote_ident;
use crate::error::{MigrateError, Result};

/// Which side of a key range the predicate describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Row key `>=` the tuple (inclusive lower bound).
    Lower,
    /// Row key `<` the tuple (exclusive upper bound).
    Upper,
}

impl Bound {
    /// Operator for every column but the last.
    fn leading_op(self) -> &'static str {
        match self {
            Bound::Lower => ">",
            Bound::Upper => "<",
        }
    }

    /// Operator for the last column, which decides ties.
    fn last_op(self) -> &'static str {
        match self {
            Bound::Lower => ">=",
            Bound::Upper => "<",
        }
    }
}

/// Build `c1 OP @p1 or (c1 = @p1 and (...))` over the key columns.
///
/// `params` are placeholder names without the leading `@`. The two slices
/// must have the same non-zero length.
pub fn lexicographic<C, P>(columns: &[C], params: &[P], bound: Bound) -> Result<String>
where
    C: AsRef<str>,
    P: AsRef<str>,
{
    if columns.len() != params.len() {
        return Err(MigrateError::integrity(format!(
            "key predicate needs one parameter per column, got {} columns and {} parameters",
            columns.len(),
            params.len()
        )));
    }

    let mut pairs = columns
        .iter()
        .zip(params)
        .map(|(c, p)| (quote_ident(c.as_ref()), format!("@{}", p.as_ref())))
        .rev();

    let (column, param) = pairs
        .next()
        .ok_or_else(|| MigrateError::integrity("key predicate needs at least one column"))?;
    let innermost = format!("{} {} {}", column, bound.last_op(), param);

    Ok(pairs.fold(innermost, |inner, (column, param)| {
        format!(
            "{c} {op} {p} or ({c} = {p} and ({inner}))",
            c = column,
            op = bound.leading_op(),
            p = param,
            inner = inner
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column() {
        assert_eq!(
            lexicographic(&["Id1"], &["p1"], Bound::Upper).unwrap(),
            "`Id1` < @p1"
        );
        assert_eq!(
            lexicographic(&["Id1"], &["p1"], Bound::Lower).unwrap(),
            "`Id1` >= @p1"
        );
    }

    #[test]
    fn test_two_columns_upper() {
        assert_eq!(
            lexicographic(&["Id1", "Id2"], &["p1", "p2"], Bound::Upper).unwrap(),
            "`Id1` < @p1 or (`Id1` = @p1 and (`Id2` < @p2))"
        );
    }

    #[test]
    fn test_two_columns_lower() {
        assert_eq!(
            lexicographic(&["Id0", "Id1"], &["from_0", "from_1"], Bound::Lower).unwrap(),
            "`Id0` > @from_0 or (`Id0` = @from_0 and (`Id1` >= @from_1))"
        );
    }

    #[test]
    fn test_three_columns_nest() {
        assert_eq!(
            lexicographic(&["a", "b", "c"], &["x", "y", "z"], Bound::Upper).unwrap(),
            "`a` < @x or (`a` = @x and (`b` < @y or (`b` = @y and (`c` < @z))))"
        );
    }

    #[test]
    fn test_length_mismatch() {
        let err = lexicographic(&["a", "b"], &["x"], Bound::Lower).unwrap_err();
        assert!(matches!(err, MigrateError::DataIntegrity(_)));
    }

    #[test]
    fn test_empty_key() {
        let empty: [&str; 0] = [];
        assert!(lexicographic(&empty, &empty, Bound::Upper).is_err());
    }
}
