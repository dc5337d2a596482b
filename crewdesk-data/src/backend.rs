use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crewdesk_core::RawError;

use crate::query::SelectQuery;

/// Future returned by every [`Backend`] call.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, RawError>> + Send + 'a>>;

/// The hosted database behind the data layer.
///
/// Payloads are wire-shaped JSON (snake_case keys). Implementations return
/// raw failures; normalization happens in the data client.
pub trait Backend: Send + Sync + 'static {
    /// Rows matching `query`: an array, or one object when the query is
    /// [`single`](SelectQuery::single).
    fn select<'a>(&'a self, query: &'a SelectQuery) -> BackendFuture<'a>;

    /// Insert `rows`, returning the stored rows as an array.
    fn insert<'a>(&'a self, table: &'a str, rows: Vec<Value>) -> BackendFuture<'a>;

    /// Apply `patch` to the row whose `id_column` equals `id`, returning the
    /// updated row.
    fn update<'a>(&'a self, table: &'a str, id_column: &'a str, id: &'a str, patch: Value) -> BackendFuture<'a>;

    /// Delete every row whose `id_column` is in `ids`.
    fn delete<'a>(&'a self, table: &'a str, id_column: &'a str, ids: &'a [String]) -> BackendFuture<'a>;
}
