//! Declarative query composition.
//!
//! A [`QuerySpec`] describes select, filter, pivot, order and paging steps;
//! [`QueryBuilder::build`] renders it over a table or an arbitrary statement
//! into one SQL query. Building never touches the store: column existence is
//! checked by the store when the plan runs.
//!
//! Steps are applied in a fixed order:
//!
//! 1. select (caller's column order)
//! 2. filter
//! 3. pivot
//! 4. order, one direction for every order column
//! 5. limit and offset, after sorting
//!
//! A pivot needs the distinct values of its pivot column to name the output
//! columns. [`QueryBuilder::pivot_domain`] gives the query that lists them;
//! once known they are attached with [`QuerySpec::with_pivot_domain`] and the
//! pivot renders as a plain `SELECT` that can be nested or exported. Without
//! a domain the pivot renders as a top-level `PIVOT` statement and the store
//! discovers the values itself.

use crate::error::{EngineError, Result};
use crate::ident::{quote_literal, Identifier};
use crate::lexer::{scan, Region};

/// A boolean filter expression in DuckDB syntax.
///
/// The text is spliced into the generated query, so it must be a single
/// self-contained expression: no statement separator, no comments, and
/// balanced quotes and parentheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate(String);

impl Predicate {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidFilter("filter is empty".to_string()));
        }

        let scanned = scan(text);
        let mut depth: i64 = 0;
        for token in &scanned.tokens {
            match token.region {
                Region::LineComment | Region::BlockComment => {
                    return Err(EngineError::InvalidFilter(
                        "comments are not allowed in a filter".to_string(),
                    ))
                }
                Region::Code if token.ch == ';' => {
                    return Err(EngineError::InvalidFilter(
                        "a filter must be a single expression, ';' is not allowed".to_string(),
                    ))
                }
                Region::Code if token.ch == '(' => depth += 1,
                Region::Code if token.ch == ')' => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(EngineError::InvalidFilter(
                            "unbalanced parentheses".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }
        match scanned.trailing {
            Region::Literal => Err(EngineError::InvalidFilter(
                "unterminated string literal".to_string(),
            )),
            Region::QuotedIdent => Err(EngineError::InvalidFilter(
                "unterminated quoted identifier".to_string(),
            )),
            _ if depth != 0 => Err(EngineError::InvalidFilter(
                "unbalanced parentheses".to_string(),
            )),
            _ => Ok(Self(text.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reshape rows into columns: one output column per distinct value of
/// `column`, holding the first `values` entry for each `index` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotSpec {
    pub index: Vec<Identifier>,
    pub column: Identifier,
    pub values: Identifier,
    /// Distinct values of `column`, once resolved.
    pub domain: Option<Vec<String>>,
}

impl PivotSpec {
    pub fn new(index: Vec<Identifier>, column: Identifier, values: Identifier) -> Self {
        Self {
            index,
            column,
            values,
            domain: None,
        }
    }

    /// Assemble a pivot from optional request parts.
    ///
    /// No parts means no pivot. A partial spec is rejected with
    /// `InvalidPivotSpec` rather than silently ignored.
    pub fn from_parts(
        index: Option<&[String]>,
        column: Option<&str>,
        values: Option<&str>,
    ) -> Result<Option<Self>> {
        let index = index.filter(|i| !i.is_empty());
        match (index, column, values) {
            (None, None, None) => Ok(None),
            (Some(index), Some(column), Some(values)) => Ok(Some(Self::new(
                Identifier::parse_all(index)?,
                Identifier::parse(column)?,
                Identifier::parse(values)?,
            ))),
            (index, column, values) => {
                let mut missing = Vec::new();
                if index.is_none() {
                    missing.push("pivot_index");
                }
                if column.is_none() {
                    missing.push("pivot_columns");
                }
                if values.is_none() {
                    missing.push("pivot_values");
                }
                Err(EngineError::InvalidPivotSpec(format!(
                    "pivot needs index, columns and values; missing {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Validated, immutable description of the steps to apply to a base query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    select: Option<Vec<Identifier>>,
    filter: Option<Predicate>,
    pivot: Option<PivotSpec>,
    order_by: Option<Vec<Identifier>>,
    ascending: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            select: None,
            filter: None,
            pivot: None,
            order_by: None,
            ascending: true,
            limit: None,
            offset: None,
        }
    }
}

impl QuerySpec {
    pub fn builder() -> QuerySpecBuilder {
        QuerySpecBuilder::default()
    }

    /// `true` when no step is requested.
    pub fn is_empty(&self) -> bool {
        self.select.is_none()
            && self.filter.is_none()
            && self.pivot.is_none()
            && self.order_by.is_none()
            && self.limit.is_none()
            && self.offset.is_none()
    }

    pub fn select(&self) -> Option<&[Identifier]> {
        self.select.as_deref()
    }

    pub fn filter(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    pub fn pivot(&self) -> Option<&PivotSpec> {
        self.pivot.as_ref()
    }

    pub fn order_by(&self) -> Option<&[Identifier]> {
        self.order_by.as_deref()
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// A copy of this spec with the pivot column's values resolved.
    pub fn with_pivot_domain(&self, values: Vec<String>) -> QuerySpec {
        let mut spec = self.clone();
        if let Some(pivot) = spec.pivot.as_mut() {
            pivot.domain = Some(values);
        }
        spec
    }

    /// Whether a pivot is requested whose values are still unknown.
    pub fn needs_pivot_domain(&self) -> bool {
        self.pivot.as_ref().is_some_and(|p| p.domain.is_none())
    }
}

/// Builder for [`QuerySpec`]; every name is validated in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct QuerySpecBuilder {
    select: Vec<String>,
    filter: Option<String>,
    pivot_index: Vec<String>,
    pivot_column: Option<String>,
    pivot_values: Option<String>,
    order_by: Vec<String>,
    ascending: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Default for QuerySpecBuilder {
    fn default() -> Self {
        Self {
            select: Vec::new(),
            filter: None,
            pivot_index: Vec::new(),
            pivot_column: None,
            pivot_values: None,
            order_by: Vec::new(),
            ascending: true,
            limit: None,
            offset: None,
        }
    }
}

impl QuerySpecBuilder {
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filter = Some(predicate.into());
        self
    }

    pub fn pivot_index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pivot_index = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn pivot_column(mut self, column: impl Into<String>) -> Self {
        self.pivot_column = Some(column.into());
        self
    }

    pub fn pivot_values(mut self, column: impl Into<String>) -> Self {
        self.pivot_values = Some(column.into());
        self
    }

    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> Result<QuerySpec> {
        let select = non_empty(self.select)
            .map(|c| Identifier::parse_all(&c))
            .transpose()?;
        let filter = self
            .filter
            .filter(|f| !f.trim().is_empty())
            .map(|f| Predicate::parse(&f))
            .transpose()?;
        let pivot_index = non_empty(self.pivot_index);
        let pivot = PivotSpec::from_parts(
            pivot_index.as_deref(),
            self.pivot_column.as_deref(),
            self.pivot_values.as_deref(),
        )?;
        let order_by = non_empty(self.order_by)
            .map(|c| Identifier::parse_all(&c))
            .transpose()?;

        Ok(QuerySpec {
            select,
            filter,
            pivot,
            order_by,
            ascending: self.ascending,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn non_empty(items: Vec<String>) -> Option<Vec<String>> {
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Split a comma-separated request parameter into its non-empty parts.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// What a query is built over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    Table(Identifier),
    /// A complete SQL statement used as a subquery.
    Subquery(String),
}

impl QuerySource {
    fn render(&self) -> String {
        match self {
            QuerySource::Table(table) => table.quoted(),
            QuerySource::Subquery(sql) => format!("({}) AS base", strip_terminator(sql)),
        }
    }
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// A rendered query, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub sql: String,
}

/// Renders a [`QuerySpec`] over a [`QuerySource`].
pub struct QueryBuilder;

impl QueryBuilder {
    /// Compose `spec` over `source` into a single statement.
    ///
    /// An empty spec over a raw statement returns the statement untouched, so
    /// DDL and other non-`SELECT` SQL can pass straight through.
    ///
    /// # Examples
    ///
    /// ```
    /// use duckgate_engine::{Identifier, QueryBuilder, QuerySource, QuerySpec};
    ///
    /// let spec = QuerySpec::builder()
    ///     .select(["name", "id"])
    ///     .order_by(["id"])
    ///     .limit(3)
    ///     .offset(2)
    ///     .build()
    ///     .unwrap();
    /// let table = QuerySource::Table(Identifier::parse("users").unwrap());
    /// let plan = QueryBuilder::build(&table, &spec);
    /// assert_eq!(
    ///     plan.sql,
    ///     "SELECT \"name\", \"id\" FROM \"users\" ORDER BY \"id\" ASC LIMIT 3 OFFSET 2"
    /// );
    /// ```
    pub fn build(source: &QuerySource, spec: &QuerySpec) -> QueryPlan {
        if let (QuerySource::Subquery(sql), true) = (source, spec.is_empty()) {
            return QueryPlan { sql: sql.clone() };
        }

        let mut sql = Self::filtered(source, spec);
        if let Some(pivot) = spec.pivot() {
            sql = match &pivot.domain {
                Some(domain) if domain.is_empty() => format!(
                    "SELECT {} FROM ({}) AS pivot_source GROUP BY {}",
                    join_quoted(&pivot.index),
                    sql,
                    join_quoted(&pivot.index)
                ),
                Some(domain) => format!(
                    "SELECT * FROM ({}) AS pivot_source PIVOT (first({}) FOR {} IN ({}) GROUP BY {})",
                    sql,
                    pivot.values.quoted(),
                    pivot.column.quoted(),
                    domain
                        .iter()
                        .map(|v| quote_literal(v))
                        .collect::<Vec<_>>()
                        .join(", "),
                    join_quoted(&pivot.index)
                ),
                None => format!(
                    "PIVOT ({}) ON {} USING first({}) GROUP BY {}",
                    sql,
                    pivot.column.quoted(),
                    pivot.values.quoted(),
                    join_quoted(&pivot.index)
                ),
            };
        }

        if let Some(order_by) = spec.order_by() {
            let direction = if spec.ascending() { "ASC" } else { "DESC" };
            let keys: Vec<String> = order_by
                .iter()
                .map(|c| format!("{} {}", c.quoted(), direction))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        if let Some(limit) = spec.limit() {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = spec.offset() {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        QueryPlan { sql }
    }

    /// The query listing the distinct, non-null values of the pivot column,
    /// as text, in sorted order. `None` when no pivot is requested.
    pub fn pivot_domain(source: &QuerySource, spec: &QuerySpec) -> Option<QueryPlan> {
        let pivot = spec.pivot()?;
        let column = pivot.column.quoted();
        Some(QueryPlan {
            sql: format!(
                "SELECT DISTINCT CAST({col} AS VARCHAR) AS pivot_value FROM ({}) AS pivot_source \
                 WHERE {col} IS NOT NULL ORDER BY 1",
                Self::filtered(source, spec),
                col = column
            ),
        })
    }

    /// Select and filter steps.
    fn filtered(source: &QuerySource, spec: &QuerySpec) -> String {
        let projection = match spec.select() {
            Some(columns) => join_quoted(columns),
            None => "*".to_string(),
        };
        let mut sql = format!("SELECT {} FROM {}", projection, source.render());
        if let Some(filter) = spec.filter() {
            sql.push_str(&format!(" WHERE ({})", filter.as_str()));
        }
        sql
    }
}

fn join_quoted(columns: &[Identifier]) -> String {
    columns
        .iter()
        .map(Identifier::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}
