use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crewdesk_cache::{
    query_fn, FilterSet, FilterValue, ListWindow, ObserverGuard, OrderBy, QueryFn, QueryKey,
    QueryKeys, QueryOptions,
};
use crewdesk_core::{decamelize, to_snake_case, AppError, ReportOptions};

use crate::client::{decode, CallOptions};
use crate::entity::Entity;
use crate::layer::DataLayer;
use crate::query::SelectQuery;

/// Page size used when only an offset is given.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Joined-relation fields removed from dynamic update payloads.
pub const DEFAULT_RELATION_FIELDS: &[&str] = &[
    "organisation",
    "location",
    "owner",
    "manager",
    "contractor",
    "assignedContractor",
    "createdBy",
    "files",
    "jobFiles",
];

/// Configuration of one [`CrudResource`].
#[derive(Debug, Clone)]
pub struct CrudConfig {
    pub table_name: String,
    pub keys: QueryKeys,
    /// Select clause for list fetches.
    pub select: String,
    /// Falls back to the layer's `query.stale_time`.
    pub stale_time: Option<Duration>,
    /// Falls back to the layer's `query.gc_time`.
    pub gc_time: Option<Duration>,
    /// camelCase fields stripped from dynamic update payloads.
    pub relation_fields: Vec<String>,
    /// camelCase array-valued columns kept in dynamic update payloads.
    pub array_columns: Vec<String>,
    /// Raise a toast when an operation of this resource fails.
    pub notify_errors: bool,
}

impl CrudConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            keys: QueryKeys::new(table_name.clone()),
            table_name,
            select: "*".to_string(),
            stale_time: None,
            gc_time: None,
            relation_fields: DEFAULT_RELATION_FIELDS.iter().map(|f| f.to_string()).collect(),
            array_columns: Vec::new(),
            notify_errors: true,
        }
    }

    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::table_name()).with_select(E::select())
    }

    pub fn with_keys(mut self, keys: QueryKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = select.into();
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = Some(gc_time);
        self
    }

    pub fn with_relation_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_array_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.array_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_notify_errors(mut self, notify: bool) -> Self {
        self.notify_errors = notify;
        self
    }
}

/// Filters, ordering and pagination of a list. Field names are camelCase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub filters: Option<FilterSet>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: FilterSet) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Add one equality filter.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters
            .get_or_insert_with(FilterSet::new)
            .insert(field, value);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn window(&self) -> ListWindow {
        ListWindow {
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Inclusive row range `[offset, offset + limit - 1]`.
    pub fn range(&self) -> Option<(u64, u64)> {
        let span = |from: u64, count: u32| (from, from + u64::from(count.max(1)) - 1);
        match (self.limit, self.offset) {
            (Some(limit), offset) => Some(span(u64::from(offset.unwrap_or(0)), limit)),
            (None, Some(offset)) => Some(span(u64::from(offset), DEFAULT_PAGE_SIZE)),
            (None, None) => None,
        }
    }
}

/// What a list handle exposes to its consumer.
#[derive(Debug, Clone)]
pub struct ListState<E> {
    /// Empty until data arrives.
    pub data: Vec<E>,
    /// The first fetch is in flight: no payload and no error yet. An idle
    /// handle that was never loaded is not loading.
    pub is_loading: bool,
    /// A request for this list is in flight.
    pub is_fetching: bool,
    /// At least one item arrived. False for an empty list.
    pub has_data: bool,
    pub error: Option<AppError>,
    pub is_creating: bool,
    pub is_updating: bool,
    pub is_deleting: bool,
}

#[derive(Clone, Default)]
struct MutationFlags {
    creating: Arc<AtomicUsize>,
    updating: Arc<AtomicUsize>,
    deleting: Arc<AtomicUsize>,
}

struct FlagGuard(Arc<AtomicUsize>);

impl FlagGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn is_active(counter: &AtomicUsize) -> bool {
    counter.load(Ordering::SeqCst) > 0
}

/// Cached list queries and mutations for one entity.
///
/// Every successful mutation invalidates the entity root key, so all lists
/// and details of the entity refetch: observed entries immediately, the rest
/// on their next load.
pub struct CrudResource<E> {
    layer: DataLayer,
    config: Arc<CrudConfig>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for CrudResource<E> {
    fn clone(&self) -> Self {
        Self {
            layer: self.layer.clone(),
            config: self.config.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for CrudResource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudResource")
            .field("table", &self.config.table_name)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> CrudResource<E> {
    pub fn new(layer: &DataLayer, config: CrudConfig) -> Self {
        Self {
            layer: layer.clone(),
            config: Arc::new(config),
            _entity: PhantomData,
        }
    }

    pub fn for_entity(layer: &DataLayer) -> Self {
        Self::new(layer, CrudConfig::for_entity::<E>())
    }

    pub fn config(&self) -> &CrudConfig {
        &self.config
    }

    pub fn keys(&self) -> &QueryKeys {
        &self.config.keys
    }

    pub fn layer(&self) -> &DataLayer {
        &self.layer
    }

    pub fn query_options(&self) -> QueryOptions {
        let defaults = self.layer.cache().defaults().query;
        QueryOptions {
            stale_time: self.config.stale_time.unwrap_or(defaults.stale_time),
            gc_time: self.config.gc_time.unwrap_or(defaults.gc_time),
            notify_errors: self.config.notify_errors,
        }
    }

    pub fn list_key(&self, options: &ListOptions) -> QueryKey {
        self.config
            .keys
            .list_window(options.filters.as_ref(), Some(&options.window()))
    }

    /// The backend query for a list: filters and ordering with snake_case
    /// columns, plus the row range.
    pub fn select_query(&self, options: &ListOptions) -> SelectQuery {
        let mut query = SelectQuery::new(&self.config.table_name).columns(&self.config.select);
        if let Some(filters) = &options.filters {
            for (field, value) in filters.iter() {
                query = query.filter(&to_snake_case(field), value);
            }
        }
        if let Some(order) = &options.order_by {
            query = query.order(&to_snake_case(&order.column), order.ascending);
        }
        if let Some((from, to)) = options.range() {
            query = query.range(from, to);
        }
        query
    }

    fn list_query_fn(&self, query: SelectQuery) -> QueryFn {
        let client = self.layer.client().clone();
        let operation = format!("fetching {}", self.config.table_name);
        query_fn(move || {
            let client = client.clone();
            let query = query.clone();
            // Failures are reported by the cache once retries are exhausted.
            let options = CallOptions::operation(operation.clone()).deferred();
            async move {
                client
                    .query_with(options, move |backend| {
                        let query = query.clone();
                        async move { backend.select(&query).await }
                    })
                    .await
                    .into_result()
            }
        })
    }

    /// A handle observing the list described by `options`.
    pub fn list(&self, options: ListOptions) -> ListHandle<E> {
        let key = self.list_key(&options);
        let observer = self.layer.cache().observe(&key, self.query_options());
        ListHandle {
            resource: self.clone(),
            query_fn: self.list_query_fn(self.select_query(&options)),
            options,
            key,
            flags: MutationFlags::default(),
            _observer: observer,
        }
    }

    /// Fetch a list through the cache without keeping a handle.
    pub async fn fetch_list(&self, options: &ListOptions) -> Result<Vec<E>, AppError> {
        let key = self.list_key(options);
        let query_fn = self.list_query_fn(self.select_query(options));
        let data = self
            .layer
            .cache()
            .fetch(&key, self.query_options(), query_fn)
            .await?;
        decode((*data).clone(), Some(self.operation("fetching").as_str()))
    }

    pub async fn create(&self, item: &E::Create) -> Result<E, AppError> {
        let mut created = self.create_many(std::slice::from_ref(item)).await?;
        created.pop().ok_or_else(|| {
            AppError::transform("Insert returned no rows", self.operation("creating"))
        })
    }

    pub async fn create_many(&self, items: &[E::Create]) -> Result<Vec<E>, AppError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let operation = self.operation("creating");
        let rows = items
            .iter()
            .map(|item| self.to_wire(item, &operation))
            .collect::<Result<Vec<_>, _>>()?;
        let table = self.config.table_name.clone();
        let result = self
            .layer
            .client()
            .mutate_with(self.call_options(&operation), move |backend| {
                let table = table.clone();
                let rows = rows.clone();
                async move { backend.insert(&table, rows).await }
            })
            .await
            .into_result();
        let created = decode(result?, Some(operation.as_str()));
        self.invalidate().await;
        created
    }

    pub async fn update(&self, id: &str, changes: &E::Update) -> Result<E, AppError> {
        let operation = self.operation("updating");
        let patch = self.to_wire(changes, &operation)?;
        let updated = self.update_row(id, patch, &operation).await;
        if updated.is_ok() {
            self.invalidate().await;
        }
        updated
    }

    /// Apply each `(id, changes)` pair concurrently. The lists are refreshed
    /// once, after every update settled; the first failure is returned.
    pub async fn update_many(&self, changes: &[(String, E::Update)]) -> Result<Vec<E>, AppError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let operation = self.operation("updating");
        let mut patches = Vec::with_capacity(changes.len());
        for (id, update) in changes {
            patches.push((id.as_str(), self.to_wire(update, &operation)?));
        }
        let results = join_all(
            patches
                .into_iter()
                .map(|(id, patch)| self.update_row(id, patch, &operation)),
        )
        .await;
        if results.iter().any(Result::is_ok) {
            self.invalidate().await;
        }
        results.into_iter().collect()
    }

    /// Update from a dynamic JSON payload, sanitized with
    /// [`sanitize_update`](Self::sanitize_update).
    pub async fn update_value(&self, id: &str, changes: Value) -> Result<E, AppError> {
        let operation = self.operation("updating");
        let patch = decamelize(self.sanitize_update(changes));
        let updated = self.update_row(id, patch, &operation).await;
        if updated.is_ok() {
            self.invalidate().await;
        }
        updated
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.delete_many(&[id.to_string()]).await
    }

    pub async fn delete_many(&self, ids: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }
        let operation = self.operation("deleting");
        let table = self.config.table_name.clone();
        let ids = ids.to_vec();
        self.layer
            .client()
            .mutate_with(self.call_options(&operation), move |backend| {
                let table = table.clone();
                let ids = ids.clone();
                async move { backend.delete(&table, E::id_column(), &ids).await }
            })
            .await
            .into_result()?;
        self.invalidate().await;
        Ok(())
    }

    /// Drop joined-relation fields and array values from an update payload.
    /// Arrays survive only for columns listed in `array_columns`.
    pub fn sanitize_update(&self, changes: Value) -> Value {
        match changes {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(field, value)| {
                        let relation = self.config.relation_fields.iter().any(|f| f == field);
                        let dropped_array = value.is_array()
                            && !self.config.array_columns.iter().any(|c| c == field);
                        if relation || dropped_array {
                            tracing::trace!(field = %field, "stripped from update payload");
                        }
                        !relation && !dropped_array
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    /// Invalidate everything under the entity root and wait for observed
    /// lists to refetch.
    pub async fn invalidate(&self) {
        let refetched = self
            .layer
            .cache()
            .invalidate_and_refetch(&self.config.keys.all())
            .await;
        tracing::debug!(table = %self.config.table_name, refetched, "entity invalidated");
    }

    async fn update_row(&self, id: &str, patch: Value, operation: &str) -> Result<E, AppError> {
        let table = self.config.table_name.clone();
        let id = id.to_string();
        let value = self
            .layer
            .client()
            .mutate_with(self.call_options(operation), move |backend| {
                let table = table.clone();
                let id = id.clone();
                let patch = patch.clone();
                async move { backend.update(&table, E::id_column(), &id, patch).await }
            })
            .await
            .into_result()?;
        decode(value, Some(operation))
    }

    fn to_wire<T: Serialize>(&self, payload: &T, operation: &str) -> Result<Value, AppError> {
        serde_json::to_value(payload).map(decamelize).map_err(|err| {
            let err = AppError::transform(err, operation);
            self.layer
                .client()
                .reporter()
                .report(&err, self.report_options());
            err
        })
    }

    fn operation(&self, verb: &str) -> String {
        format!("{verb} {}", self.config.table_name)
    }

    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            show_toast: self.config.notify_errors && self.layer.settings().notify_errors,
            redirect_on_auth: true,
        }
    }

    fn call_options(&self, operation: &str) -> CallOptions {
        CallOptions::operation(operation).with_report(self.report_options())
    }
}

/// A live view of one list.
///
/// Holding the handle keeps the cache entry observed, so mutations anywhere
/// on the entity refetch it. Mutation flags are per handle.
pub struct ListHandle<E> {
    resource: CrudResource<E>,
    options: ListOptions,
    key: QueryKey,
    query_fn: QueryFn,
    flags: MutationFlags,
    _observer: ObserverGuard,
}

impl<E: Entity> ListHandle<E> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn options(&self) -> &ListOptions {
        &self.options
    }

    pub fn state(&self) -> ListState<E> {
        let snapshot = self.resource.layer.cache().get(&self.key);
        let (payload, cached_error, is_fetching) = match snapshot {
            Some(s) => (s.data, s.error, s.is_fetching),
            None => (None, None, false),
        };
        let (data, decode_error) = match payload {
            Some(payload) => match decode::<Vec<E>>((*payload).clone(), None) {
                Ok(items) => (Some(items), None),
                Err(err) => (None, Some(err)),
            },
            None => (None, None),
        };
        let has_payload = data.is_some();
        let has_data = data.as_ref().is_some_and(|items| !items.is_empty());
        let error = cached_error.or(decode_error);
        ListState {
            is_loading: !has_payload && error.is_none() && is_fetching,
            data: data.unwrap_or_default(),
            is_fetching,
            has_data,
            error,
            is_creating: is_active(&self.flags.creating),
            is_updating: is_active(&self.flags.updating),
            is_deleting: is_active(&self.flags.deleting),
        }
    }

    /// Fetch unless the cached list is fresh.
    pub async fn load(&self) -> Result<Vec<E>, AppError> {
        let data = self
            .resource
            .layer
            .cache()
            .fetch(&self.key, self.resource.query_options(), self.query_fn.clone())
            .await?;
        decode((*data).clone(), None)
    }

    /// Fetch now, ignoring freshness.
    pub async fn refetch(&self) -> Result<Vec<E>, AppError> {
        let data = self
            .resource
            .layer
            .cache()
            .fetch_now(&self.key, self.resource.query_options(), self.query_fn.clone())
            .await?;
        decode((*data).clone(), None)
    }

    pub async fn create_item(&self, item: &E::Create) -> Result<E, AppError> {
        let _flag = FlagGuard::enter(&self.flags.creating);
        self.resource.create(item).await
    }

    pub async fn create_items(&self, items: &[E::Create]) -> Result<Vec<E>, AppError> {
        let _flag = FlagGuard::enter(&self.flags.creating);
        self.resource.create_many(items).await
    }

    pub async fn update_item(&self, id: &str, changes: &E::Update) -> Result<E, AppError> {
        let _flag = FlagGuard::enter(&self.flags.updating);
        self.resource.update(id, changes).await
    }

    pub async fn update_items(&self, changes: &[(String, E::Update)]) -> Result<Vec<E>, AppError> {
        let _flag = FlagGuard::enter(&self.flags.updating);
        self.resource.update_many(changes).await
    }

    pub async fn update_item_value(&self, id: &str, changes: Value) -> Result<E, AppError> {
        let _flag = FlagGuard::enter(&self.flags.updating);
        self.resource.update_value(id, changes).await
    }

    pub async fn delete_item(&self, id: &str) -> Result<(), AppError> {
        let _flag = FlagGuard::enter(&self.flags.deleting);
        self.resource.delete(id).await
    }

    pub async fn delete_items(&self, ids: &[String]) -> Result<(), AppError> {
        let _flag = FlagGuard::enter(&self.flags.deleting);
        self.resource.delete_many(ids).await
    }

    /// Fire-and-forget [`create_item`](Self::create_item). The flag is set
    /// until the spawned task finishes.
    pub fn create_item_detached(&self, item: E::Create) -> JoinHandle<Result<E, AppError>> {
        let flag = FlagGuard::enter(&self.flags.creating);
        let resource = self.resource.clone();
        tokio::spawn(async move {
            let _flag = flag;
            resource.create(&item).await
        })
    }

    pub fn update_item_detached(&self, id: String, changes: E::Update) -> JoinHandle<Result<E, AppError>> {
        let flag = FlagGuard::enter(&self.flags.updating);
        let resource = self.resource.clone();
        tokio::spawn(async move {
            let _flag = flag;
            resource.update(&id, &changes).await
        })
    }

    pub fn delete_item_detached(&self, id: String) -> JoinHandle<Result<(), AppError>> {
        let flag = FlagGuard::enter(&self.flags.deleting);
        let resource = self.resource.clone();
        tokio::spawn(async move {
            let _flag = flag;
            resource.delete(&id).await
        })
    }
}

impl<E> std::fmt::Debug for ListHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListHandle")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
