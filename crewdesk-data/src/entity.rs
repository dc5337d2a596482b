use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record stored in one backend table.
///
/// Records travel as camelCase JSON on the application side. `Create` and
/// `Update` are the payload types accepted by the CRUD operations; they should
/// carry only writable columns.
///
/// # Example
///
/// ```ignore
/// impl Entity for Job {
///     type Create = CreateJob;
///     type Update = UpdateJob;
///     fn table_name() -> &'static str { "jobs" }
///     fn id(&self) -> &str { &self.id }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    type Create: Serialize + Send + Sync + 'static;
    type Update: Serialize + Send + Sync + 'static;

    fn table_name() -> &'static str;

    /// Primary key column, snake_case.
    fn id_column() -> &'static str {
        "id"
    }

    /// Default select clause.
    fn select() -> &'static str {
        "*"
    }

    fn id(&self) -> &str;
}
