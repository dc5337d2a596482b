use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crewdesk_cache::{
    query_fn, KeySegment, ObserverGuard, QueryFn, QueryKey, QueryKeys, QueryOptions,
};
use crewdesk_core::AppError;

use crate::client::{decode, CallOptions};
use crate::entity::Entity;
use crate::layer::DataLayer;
use crate::query::SelectQuery;

/// Where item keys hang: under an entity's `detail` branch, or directly under
/// a plain root as `[root, id]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRoot {
    Keys(QueryKeys),
    Name(String),
}

impl KeyRoot {
    pub fn key_for(&self, id: &str) -> QueryKey {
        match self {
            KeyRoot::Keys(keys) => keys.detail(id),
            KeyRoot::Name(name) => QueryKey::root(name.clone()).child(KeySegment::Id(id.to_string())),
        }
    }

    /// The key invalidated when this entity changes.
    pub fn root(&self) -> QueryKey {
        match self {
            KeyRoot::Keys(keys) => keys.all(),
            KeyRoot::Name(name) => QueryKey::root(name.clone()),
        }
    }
}

impl From<QueryKeys> for KeyRoot {
    fn from(keys: QueryKeys) -> Self {
        KeyRoot::Keys(keys)
    }
}

impl From<&str> for KeyRoot {
    fn from(name: &str) -> Self {
        KeyRoot::Name(name.to_string())
    }
}

impl From<String> for KeyRoot {
    fn from(name: String) -> Self {
        KeyRoot::Name(name)
    }
}

#[derive(Debug, Clone)]
pub struct ItemConfig {
    pub table_name: String,
    pub key_root: KeyRoot,
    pub select: String,
    pub stale_time: Option<Duration>,
    pub gc_time: Option<Duration>,
    pub notify_errors: bool,
}

impl ItemConfig {
    pub fn new(table_name: impl Into<String>, key_root: impl Into<KeyRoot>) -> Self {
        Self {
            table_name: table_name.into(),
            key_root: key_root.into(),
            select: "*".to_string(),
            stale_time: None,
            gc_time: None,
            notify_errors: true,
        }
    }

    /// Item keys under the entity's own key factory.
    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::table_name(), QueryKeys::new(E::table_name())).with_select(E::select())
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

    pub fn with_notify_errors(mut self, notify: bool) -> Self {
        self.notify_errors = notify;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ItemState<E> {
    pub data: Option<E>,
    /// The first fetch is in flight.
    pub is_loading: bool,
    pub is_fetching: bool,
    pub error: Option<AppError>,
    /// False when the handle was created with an empty id.
    pub is_enabled: bool,
}

/// Cached access to single records by id.
pub struct ItemResource<E> {
    layer: DataLayer,
    config: Arc<ItemConfig>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for ItemResource<E> {
    fn clone(&self) -> Self {
        Self {
            layer: self.layer.clone(),
            config: self.config.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for ItemResource<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemResource")
            .field("table", &self.config.table_name)
            .field("key_root", &self.config.key_root)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> ItemResource<E> {
    pub fn new(layer: &DataLayer, config: ItemConfig) -> Self {
        Self {
            layer: layer.clone(),
            config: Arc::new(config),
            _entity: PhantomData,
        }
    }

    pub fn for_entity(layer: &DataLayer) -> Self {
        Self::new(layer, ItemConfig::for_entity::<E>())
    }

    pub fn config(&self) -> &ItemConfig {
        &self.config
    }

    pub fn key(&self, id: &str) -> QueryKey {
        self.config.key_root.key_for(id)
    }

    pub fn query_options(&self) -> QueryOptions {
        let defaults = self.layer.cache().defaults().query;
        QueryOptions {
            stale_time: self.config.stale_time.unwrap_or(defaults.stale_time),
            gc_time: self.config.gc_time.unwrap_or(defaults.gc_time),
            notify_errors: self.config.notify_errors,
        }
    }

    pub fn select_query(&self, id: &str) -> SelectQuery {
        SelectQuery::new(&self.config.table_name)
            .columns(&self.config.select)
            .eq(E::id_column(), serde_json::Value::String(id.to_string()))
            .single()
    }

    fn item_query_fn(&self, id: &str) -> QueryFn {
        let client = self.layer.client().clone();
        let query = self.select_query(id);
        let operation = format!("fetching {}", self.config.table_name);
        query_fn(move || {
            let client = client.clone();
            let query = query.clone();
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

    /// A handle for the record with `id`. An empty id gives a disabled handle
    /// that never reaches the backend.
    pub fn item(&self, id: impl Into<String>) -> ItemHandle<E> {
        let id = id.into();
        let enabled = !id.is_empty();
        let key = self.key(&id);
        let observer = enabled.then(|| self.layer.cache().observe(&key, self.query_options()));
        ItemHandle {
            resource: self.clone(),
            query_fn: self.item_query_fn(&id),
            id,
            key,
            _observer: observer,
        }
    }

    /// Fetch one record through the cache. `Ok(None)` for an empty id.
    pub async fn fetch(&self, id: &str) -> Result<Option<E>, AppError> {
        if id.is_empty() {
            return Ok(None);
        }
        let data = self
            .layer
            .cache()
            .fetch(&self.key(id), self.query_options(), self.item_query_fn(id))
            .await?;
        decode((*data).clone(), None).map(Some)
    }
}

/// A live view of one record.
pub struct ItemHandle<E> {
    resource: ItemResource<E>,
    id: String,
    key: QueryKey,
    query_fn: QueryFn,
    _observer: Option<ObserverGuard>,
}

impl<E: Entity> ItemHandle<E> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn state(&self) -> ItemState<E> {
        if !self.is_enabled() {
            return ItemState {
                data: None,
                is_loading: false,
                is_fetching: false,
                error: None,
                is_enabled: false,
            };
        }
        let snapshot = self.resource.layer.cache().get(&self.key);
        let (payload, cached_error, is_fetching) = match snapshot {
            Some(s) => (s.data, s.error, s.is_fetching),
            None => (None, None, false),
        };
        let (data, decode_error) = match payload {
            Some(payload) => match decode::<E>((*payload).clone(), None) {
                Ok(item) => (Some(item), None),
                Err(err) => (None, Some(err)),
            },
            None => (None, None),
        };
        let error = cached_error.or(decode_error);
        ItemState {
            is_loading: data.is_none() && error.is_none() && is_fetching,
            data,
            is_fetching,
            error,
            is_enabled: true,
        }
    }

    pub async fn load(&self) -> Result<Option<E>, AppError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let data = self
            .resource
            .layer
            .cache()
            .fetch(&self.key, self.resource.query_options(), self.query_fn.clone())
            .await?;
        decode((*data).clone(), None).map(Some)
    }

    pub async fn refetch(&self) -> Result<Option<E>, AppError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let data = self
            .resource
            .layer
            .cache()
            .fetch_now(&self.key, self.resource.query_options(), self.query_fn.clone())
            .await?;
        decode((*data).clone(), None).map(Some)
    }
}

impl<E> std::fmt::Debug for ItemHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemHandle")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
