use std::fmt;

use serde_json::Value;

use crewdesk_cache::FilterValue;

/// A select request against one table, in backend (snake_case) column names.
///
/// Rendered through `Display` in the backend's REST query-string form, which
/// is what gets logged:
///
/// ```
/// use crewdesk_data::SelectQuery;
/// use serde_json::json;
///
/// let q = SelectQuery::new("jobs")
///     .eq("status", json!("AVAILABLE"))
///     .order("created_at", false)
///     .range(0, 9);
/// assert_eq!(
///     q.to_string(),
///     "jobs?select=*&status=eq.AVAILABLE&order=created_at.desc&offset=0&limit=10"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    table: String,
    columns: String,
    filters: Vec<Filter>,
    order: Vec<(String, bool)>,
    range: Option<(u64, u64)>,
    single: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(col, _) | Filter::In(col, _) | Filter::IsNull(col) => col,
        }
    }
}

impl SelectQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            range: None,
            single: false,
        }
    }

    /// Select clause, e.g. `"*"` or `"*, location:locations(*)"`.
    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: Value) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value));
        self
    }

    pub fn in_list(mut self, column: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    /// Equality filter from a cache-key filter value: null becomes `IS NULL`,
    /// a list becomes `IN (...)`.
    pub fn filter(self, column: &str, value: &FilterValue) -> Self {
        match value {
            FilterValue::Null => self.is_null(column),
            FilterValue::List(items) => {
                self.in_list(column, items.iter().map(FilterValue::to_json).collect())
            }
            other => self.eq(column, other.to_json()),
        }
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order.push((column.to_string(), ascending));
        self
    }

    /// Inclusive row range `[from, to]`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to.max(from)));
        self
    }

    /// Expect exactly one row; the result is an object instead of an array.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn select_clause(&self) -> &str {
        &self.columns
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> &[(String, bool)] {
        &self.order
    }

    pub fn row_range(&self) -> Option<(u64, u64)> {
        self.range
    }

    pub fn is_single(&self) -> bool {
        self.single
    }

    /// Reject table and column names that are not plain identifiers.
    pub fn validate(&self) -> Result<(), QueryError> {
        check_identifier(&self.table, "table")?;
        for filter in &self.filters {
            check_identifier(filter.column(), "column")?;
        }
        for (column, _) in &self.order {
            check_identifier(column, "column")?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?select={}", self.table, self.columns)?;
        for filter in &self.filters {
            match filter {
                Filter::Eq(col, val) => write!(f, "&{col}=eq.{}", render_value(val))?,
                Filter::In(col, vals) => {
                    let rendered: Vec<_> = vals.iter().map(render_value).collect();
                    write!(f, "&{col}=in.({})", rendered.join(","))?
                }
                Filter::IsNull(col) => write!(f, "&{col}=is.null")?,
            }
        }
        if !self.order.is_empty() {
            let clauses: Vec<_> = self
                .order
                .iter()
                .map(|(col, asc)| {
                    if *asc {
                        format!("{col}.asc")
                    } else {
                        format!("{col}.desc")
                    }
                })
                .collect();
            write!(f, "&order={}", clauses.join(","))?;
        }
        if let Some((from, to)) = self.range {
            write!(f, "&offset={from}&limit={}", to - from + 1)?;
        }
        Ok(())
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
        }
    }
}

impl std::error::Error for QueryError {}

fn check_identifier(ident: &str, kind: &'static str) -> Result<(), QueryError> {
    if is_valid_identifier(ident) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier {
            kind,
            ident: ident.to_string(),
        })
    }
}

fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
