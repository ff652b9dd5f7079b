//! Identifier allow-list and column type validation.
//!
//! Every table or column name that reaches SQL text goes through
//! [`Identifier::parse`] first and is rendered double-quoted. Names read back
//! from the store's own catalog use [`quote`] instead, which escapes rather
//! than validates.

use std::fmt;

use crate::error::{EngineError, Result};

/// Longest accepted identifier, in bytes (all accepted characters are ASCII).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Keywords that may never be used as table or column names.
///
/// DuckDB's reserved words plus the statement keywords that would change the
/// meaning of a generated query if they slipped through unquoted somewhere.
const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC",
    "ATTACH", "BOTH", "CASE", "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "COPY",
    "CREATE", "DEFAULT", "DEFERRABLE", "DELETE", "DESC", "DESCRIBE", "DETACH", "DISTINCT", "DO",
    "DROP", "ELSE", "END", "EXCEPT", "FALSE", "FETCH", "FOR", "FOREIGN", "FROM", "GRANT",
    "GROUP", "HAVING", "IN", "INITIALLY", "INSERT", "INTERSECT", "INTO", "LATERAL", "LEADING",
    "LIMIT", "NOT", "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "PIVOT", "PIVOT_LONGER",
    "PIVOT_WIDER", "PLACING", "PRAGMA", "PRIMARY", "QUALIFY", "REFERENCES", "RETURNING",
    "SELECT", "SHOW", "SOME", "SUMMARIZE", "SYMMETRIC", "TABLE", "THEN", "TO", "TRAILING",
    "TRUE", "TRUNCATE", "UNION", "UNIQUE", "UNPIVOT", "UPDATE", "USING", "VARIADIC", "WHEN",
    "WHERE", "WINDOW", "WITH",
];

/// A validated SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validate `name` against the allow-list.
    ///
    /// Accepts `^[A-Za-z_][A-Za-z0-9_]*$` up to [`MAX_IDENTIFIER_LEN`]
    /// characters that is not a reserved keyword.
    ///
    /// # Examples
    ///
    /// ```
    /// use duckgate_engine::Identifier;
    ///
    /// assert_eq!(Identifier::parse("order_items").unwrap().quoted(), "\"order_items\"");
    /// assert!(Identifier::parse("x; DROP TABLE t").is_err());
    /// assert!(Identifier::parse("select").is_err());
    /// ```
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(EngineError::InvalidIdentifier(format!(
                "'{}' must start with a letter or underscore and contain only letters, digits and underscores",
                truncate(name)
            )));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(EngineError::InvalidIdentifier(format!(
                "'{}...' is longer than {} characters",
                truncate(name),
                MAX_IDENTIFIER_LEN
            )));
        }
        if is_reserved(name) {
            return Err(EngineError::InvalidIdentifier(format!(
                "'{}' is a reserved keyword",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Validate every name in `names`, keeping their order.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        names.iter().map(|n| Self::parse(n.as_ref())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier rendered for SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Quote an arbitrary name read from the store's catalog.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal.
pub(crate) fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn is_reserved(name: &str) -> bool {
    RESERVED_KEYWORDS
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(name))
}

fn truncate(name: &str) -> String {
    name.chars().take(32).collect()
}

/// Validate a declared column type and normalise common aliases.
///
/// Type names are spliced into `CREATE TABLE` text, so only type-shaped
/// strings pass: words, digits, spaces, parentheses with commas, and a
/// trailing `[]`/`[n]` for lists and arrays. Whether the type actually exists
/// is left to the store, which reports an unknown type as `InvalidSchema`.
///
/// Dataframe-style aliases (`int64`, `float64`, `string`, ...) are mapped to
/// their DuckDB spelling.
pub fn normalize_type_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidSchema("column type is empty".to_string()));
    }
    validate_type_shape(trimmed)?;

    let mapped = match trimmed.to_ascii_lowercase().as_str() {
        "int8" | "int64" => "BIGINT",
        "int16" => "SMALLINT",
        "int32" => "INTEGER",
        "uint8" => "UTINYINT",
        "uint16" => "USMALLINT",
        "uint32" => "UINTEGER",
        "uint64" => "UBIGINT",
        "float32" => "FLOAT",
        "float64" => "DOUBLE",
        "str" | "string" | "utf8" => "VARCHAR",
        "binary" | "bytes" => "BLOB",
        "bool" => "BOOLEAN",
        "datetime" => "TIMESTAMP",
        _ => return Ok(trimmed.to_ascii_uppercase()),
    };
    Ok(mapped.to_string())
}

fn validate_type_shape(ty: &str) -> Result<()> {
    let invalid = || EngineError::InvalidSchema(format!("malformed column type '{}'", ty));

    if !ty.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    let mut depth: i32 = 0;
    let mut in_brackets = false;
    for c in ty.chars() {
        match c {
            c if c.is_ascii_alphanumeric() || c == '_' || c == ' ' => {
                if in_brackets && !c.is_ascii_digit() {
                    return Err(invalid());
                }
            }
            '(' if !in_brackets => depth += 1,
            ')' if !in_brackets => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid());
                }
            }
            ',' if depth > 0 => {}
            '[' if depth == 0 && !in_brackets => in_brackets = true,
            ']' if in_brackets => in_brackets = false,
            _ => return Err(invalid()),
        }
    }
    if depth != 0 || in_brackets {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["id", "_hidden", "Order2", "a_b_c", "key", "name"] {
            assert!(Identifier::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_identifiers() {
        for name in ["", "1abc", "a-b", "a b", "x; DROP TABLE other", "naïve", "\"q\""] {
            assert!(
                matches!(Identifier::parse(name), Err(EngineError::InvalidIdentifier(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_reserved_keywords_case_insensitive() {
        assert!(Identifier::parse("Select").is_err());
        assert!(Identifier::parse("drop").is_err());
        assert!(Identifier::parse("selected").is_ok());
    }

    #[test]
    fn test_length_limit() {
        let ok = "a".repeat(MAX_IDENTIFIER_LEN);
        let too_long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(Identifier::parse(&ok).is_ok());
        assert!(Identifier::parse(&too_long).is_err());
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(normalize_type_name("int64").unwrap(), "BIGINT");
        assert_eq!(normalize_type_name("varchar").unwrap(), "VARCHAR");
        assert_eq!(normalize_type_name("DECIMAL(10, 2)").unwrap(), "DECIMAL(10, 2)");
        assert_eq!(normalize_type_name("integer[]").unwrap(), "INTEGER[]");
        assert_eq!(normalize_type_name("timestamp with time zone").unwrap(), "TIMESTAMP WITH TIME ZONE");
    }

    #[test]
    fn test_malformed_type_names() {
        for ty in ["", "INT); DROP TABLE x; --", "INT)", "DECIMAL(10", "VARCHAR[x]", "'text'"] {
            assert!(
                matches!(normalize_type_name(ty), Err(EngineError::InvalidSchema(_))),
                "{ty:?} should be rejected"
            );
        }
    }
}
