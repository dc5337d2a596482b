use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};

use crewdesk_core::{BackendError, RawError};

use crate::backend::{Backend, BackendFuture};
use crate::query::{Filter, SelectQuery};

/// Backend call kinds, for call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Default)]
struct State {
    tables: DashMap<String, Vec<Value>>,
    failures: DashMap<String, VecDeque<BackendError>>,
    calls: DashMap<(Operation, String), usize>,
    selects: Mutex<Vec<SelectQuery>>,
}

/// In-memory [`Backend`] backed by `DashMap`, for tests and local runs.
///
/// Tables hold wire-shaped rows. Inserted rows get a UUID `id` and a
/// `created_at` timestamp when missing. Failures can be queued per table with
/// [`fail_next`](Self::fail_next); every call is counted and every select is
/// recorded.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<State>,
    latency: Duration,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn create_table(&self, table: &str) {
        self.state.tables.entry(table.to_string()).or_default();
    }

    /// Append rows to `table`, creating it if needed. Rows are stored as given.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        self.state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .tables
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Fail the next call against `table` with `error`. Queued errors are
    /// consumed in order.
    pub fn fail_next(&self, table: &str, error: BackendError) {
        self.state
            .failures
            .entry(table.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self, operation: Operation, table: &str) -> usize {
        self.state
            .calls
            .get(&(operation, table.to_string()))
            .map_or(0, |count| *count)
    }

    /// Every select received so far, oldest first.
    pub fn select_log(&self) -> Vec<SelectQuery> {
        self.state
            .selects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_select(&self, table: &str) -> Option<SelectQuery> {
        self.select_log()
            .into_iter()
            .rev()
            .find(|query| query.table() == table)
    }

    async fn enter(&self, operation: Operation, table: &str) -> Result<(), RawError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        *self
            .state
            .calls
            .entry((operation, table.to_string()))
            .or_insert(0) += 1;
        let queued = self
            .state
            .failures
            .get_mut(table)
            .and_then(|mut queue| queue.pop_front());
        match queued {
            Some(err) => {
                tracing::debug!(table, ?operation, error = %err, "injected backend failure");
                Err(err.into())
            }
            None => Ok(()),
        }
    }

    fn run_select(&self, query: &SelectQuery) -> Result<Value, RawError> {
        query.validate().map_err(|err| {
            BackendError::new(err.to_string())
                .with_code("PGRST100")
                .with_status(400)
        })?;
        let mut rows: Vec<Value> = {
            let table = self
                .state
                .tables
                .get(query.table())
                .ok_or_else(|| missing_table(query.table()))?;
            table
                .iter()
                .filter(|row| query.filters().iter().all(|filter| matches(row, filter)))
                .cloned()
                .collect()
        };

        // Stable sorts applied last-key-first give a multi-column ordering.
        for (column, ascending) in query.ordering().iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some((from, to)) = query.row_range() {
            rows = rows
                .into_iter()
                .skip(from as usize)
                .take((to - from + 1) as usize)
                .collect();
        }
        let rows = project(rows, query.select_clause());

        if query.is_single() {
            let count = rows.len();
            let mut rows = rows.into_iter();
            match (rows.next(), count) {
                (Some(row), 1) => Ok(row),
                _ => Err(BackendError::new("JSON object requested, multiple (or no) rows returned")
                    .with_code("PGRST116")
                    .with_details(format!("The result contains {count} rows"))
                    .with_status(406)
                    .into()),
            }
        } else {
            Ok(Value::Array(rows))
        }
    }

    fn run_insert(&self, table: &str, rows: Vec<Value>) -> Result<Value, RawError> {
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(mut map) = row else {
                return Err(BackendError::new("Inserted rows must be JSON objects")
                    .with_code("PGRST102")
                    .with_status(400)
                    .into());
            };
            map.entry("id")
                .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
            map.entry("created_at")
                .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
            stored.push(Value::Object(map));
        }
        let mut target = self
            .state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        target.extend(stored.iter().cloned());
        Ok(Value::Array(stored))
    }

    fn run_update(&self, table: &str, id_column: &str, id: &str, patch: Value) -> Result<Value, RawError> {
        let Value::Object(patch) = patch else {
            return Err(BackendError::new("Update payload must be a JSON object")
                .with_code("PGRST102")
                .with_status(400)
                .into());
        };
        let mut rows = self
            .state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        let row = rows
            .iter_mut()
            .find(|row| id_matches(row, id_column, id))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                BackendError::new("JSON object requested, multiple (or no) rows returned")
                    .with_code("PGRST116")
                    .with_details("The result contains 0 rows")
                    .with_status(406)
            })?;
        merge(row, patch);
        if row.contains_key("updated_at") {
            row.insert(
                "updated_at".into(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        Ok(Value::Object(row.clone()))
    }

    fn run_delete(&self, table: &str, id_column: &str, ids: &[String]) -> Result<Value, RawError> {
        let mut rows = self
            .state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        rows.retain(|row| !ids.iter().any(|id| id_matches(row, id_column, id)));
        Ok(Value::Null)
    }
}

impl Backend for InMemoryBackend {
    fn select<'a>(&'a self, query: &'a SelectQuery) -> BackendFuture<'a> {
        Box::pin(async move {
            self.state
                .selects
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(query.clone());
            self.enter(Operation::Select, query.table()).await?;
            self.run_select(query)
        })
    }

    fn insert<'a>(&'a self, table: &'a str, rows: Vec<Value>) -> BackendFuture<'a> {
        Box::pin(async move {
            self.enter(Operation::Insert, table).await?;
            self.run_insert(table, rows)
        })
    }

    fn update<'a>(&'a self, table: &'a str, id_column: &'a str, id: &'a str, patch: Value) -> BackendFuture<'a> {
        Box::pin(async move {
            self.enter(Operation::Update, table).await?;
            self.run_update(table, id_column, id, patch)
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id_column: &'a str, ids: &'a [String]) -> BackendFuture<'a> {
        Box::pin(async move {
            self.enter(Operation::Delete, table).await?;
            self.run_delete(table, id_column, ids)
        })
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("tables", &self.state.tables.len())
            .field("latency", &self.latency)
            .finish()
    }
}

fn missing_table(table: &str) -> BackendError {
    BackendError::new(format!("relation \"public.{table}\" does not exist"))
        .with_code("42P01")
        .with_status(404)
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let field = |col: &str| row.get(col).unwrap_or(&Value::Null);
    match filter {
        Filter::Eq(col, value) => field(col) == value,
        Filter::In(col, values) => values.contains(field(col)),
        Filter::IsNull(col) => field(col).is_null(),
    }
}

fn id_matches(row: &Value, id_column: &str, id: &str) -> bool {
    match row.get(id_column) {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Keep only the selected columns when the clause is a plain column list.
fn project(rows: Vec<Value>, clause: &str) -> Vec<Value> {
    let columns: Vec<&str> = clause.split(',').map(str::trim).collect();
    let plain = columns
        .iter()
        .all(|c| !c.is_empty() && *c != "*" && !c.contains(['(', ':']));
    if !plain {
        return rows;
    }
    rows.into_iter()
        .map(|row| match row {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| columns.contains(&k.as_str()))
                    .collect::<Map<_, _>>(),
            ),
            other => other,
        })
        .collect()
}

fn merge(row: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        row.insert(key, value);
    }
}
