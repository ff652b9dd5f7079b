//! Named statement parameters.
//!
//! SQL text refers to parameters as `$name`. DuckDB binds positionally, so
//! [`bind_named`] rewrites each placeholder to `?` and returns the values in
//! placeholder order. Values are never formatted into SQL text.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EngineError, Result};
use crate::lexer::{scan, Region};
use crate::value::Value;

/// Parameter values keyed by name (without the leading `$`).
pub type NamedParams = BTreeMap<String, Value>;

/// Rewrite `$name` placeholders to positional `?` and collect their values.
///
/// Placeholders inside string literals, quoted identifiers and comments are
/// left alone. A placeholder may appear more than once; its value is bound at
/// every position. Fails with `QueryError` when a placeholder has no value,
/// when a supplied parameter is never referenced, or when the statement uses
/// positional `$1` placeholders.
///
/// # Examples
///
/// ```
/// use duckgate_engine::{bind_named, NamedParams, Value};
///
/// let mut params = NamedParams::new();
/// params.insert("min".into(), Value::Integer(10));
/// let (sql, values) = bind_named("SELECT * FROM t WHERE x > $min", &params).unwrap();
/// assert_eq!(sql, "SELECT * FROM t WHERE x > ?");
/// assert_eq!(values, vec![Value::Integer(10)]);
/// ```
pub fn bind_named(sql: &str, params: &NamedParams) -> Result<(String, Vec<Value>)> {
    let scanned = scan(sql);
    let tokens = scanned.tokens;

    let mut rewritten = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut used = BTreeSet::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];
        // `$$` quoting and `$` inside a word are not placeholders.
        let glued = i
            .checked_sub(1)
            .and_then(|p| tokens.get(p))
            .is_some_and(|t| t.ch == '$' || t.ch.is_ascii_alphanumeric() || t.ch == '_')
            || tokens.get(i + 1).is_some_and(|t| t.ch == '$');
        let starts_name = tokens
            .get(i + 1)
            .is_some_and(|t| t.region == Region::Code && (t.ch.is_ascii_alphabetic() || t.ch == '_'));
        let starts_number = tokens
            .get(i + 1)
            .is_some_and(|t| t.region == Region::Code && t.ch.is_ascii_digit());

        if token.region == Region::Code && token.ch == '$' && !glued && starts_number {
            return Err(EngineError::query(
                sql,
                "positional parameters ($1, $2, ...) are not supported; use $name",
            ));
        }

        if token.region == Region::Code && token.ch == '$' && !glued && starts_name {
            let mut end = i + 1;
            let mut name = String::new();
            while let Some(t) = tokens.get(end) {
                if t.region != Region::Code || !(t.ch.is_ascii_alphanumeric() || t.ch == '_') {
                    break;
                }
                name.push(t.ch);
                end += 1;
            }
            let value = params
                .get(&name)
                .ok_or_else(|| EngineError::query(sql, format!("missing value for parameter ${}", name)))?;
            values.push(value.clone());
            used.insert(name);
            rewritten.push('?');
            i = end;
            continue;
        }

        rewritten.push(token.ch);
        i += 1;
    }

    if let Some(unused) = params.keys().find(|k| !used.contains(k.as_str())) {
        return Err(EngineError::query(
            sql,
            format!("parameter ${} is not referenced by the statement", unused),
        ));
    }

    Ok((rewritten, values))
}
