use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crewdesk_core::{AppError, DataSettings, RawError};

use crate::key::QueryKey;
use crate::retry::RetryPolicy;

/// Result of a cached query: the shared payload or the normalized error.
pub type QueryResult = Result<Arc<Value>, AppError>;

/// The function that loads one cache entry from the backend.
pub type QueryFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, AppError>> + Send + Sync>;

/// Called once for every failed fetch, after retries.
pub type ErrorHook = Arc<dyn Fn(&QueryKey, &AppError) + Send + Sync>;

type InFlight = Shared<BoxFuture<'static, QueryResult>>;

/// One request in the in-flight table. `generation` is the entry's
/// generation when the request started.
#[derive(Clone)]
struct Flight {
    id: u64,
    generation: u64,
    future: InFlight,
}

const EVENT_CAPACITY: usize = 256;

/// Wrap an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Freshness and retention of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long fetched data is served without refetching.
    pub stale_time: Duration,
    /// How long an entry without observers is kept.
    pub gc_time: Duration,
    /// Pass failures of this entry to the cache's error hook.
    pub notify_errors: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        let settings = DataSettings::default();
        Self {
            stale_time: settings.stale_time,
            gc_time: settings.gc_time,
            notify_errors: true,
        }
    }
}

/// Cache-wide defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub query: QueryOptions,
    pub retry: RetryPolicy,
}

impl CacheOptions {
    pub fn from_settings(settings: &DataSettings) -> Self {
        Self {
            query: QueryOptions {
                stale_time: settings.stale_time,
                gc_time: settings.gc_time,
                notify_errors: settings.notify_errors,
            },
            retry: settings.query_retry.into(),
        }
    }
}

/// Change notifications, delivered to [`QueryCache::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Failed(QueryKey),
    Invalidated(QueryKey),
    Removed(QueryKey),
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub data: Option<Arc<Value>>,
    pub error: Option<AppError>,
    pub is_fetching: bool,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
    pub observers: usize,
}

impl QuerySnapshot {
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

struct Entry {
    data: Option<Arc<Value>>,
    error: Option<AppError>,
    updated_at: Option<Instant>,
    invalidated: bool,
    /// Bumped by every invalidation. Results of requests started under an
    /// older generation are returned to their callers but never stored.
    generation: u64,
    observers: usize,
    idle_since: Instant,
    options: QueryOptions,
    query_fn: Option<QueryFn>,
}

impl Entry {
    fn new(options: QueryOptions, query_fn: Option<QueryFn>) -> Self {
        Self {
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            generation: 0,
            observers: 0,
            idle_since: Instant::now(),
            options,
            query_fn,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        if self.data.is_none() || self.invalidated {
            return true;
        }
        self.updated_at
            .map_or(true, |at| now.duration_since(at) >= self.options.stale_time)
    }

    fn is_collectable(&self, now: Instant) -> bool {
        self.observers == 0 && now.duration_since(self.idle_since) >= self.options.gc_time
    }
}

struct Inner {
    entries: DashMap<QueryKey, Entry>,
    in_flight: DashMap<QueryKey, Flight>,
    next_flight: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
    defaults: CacheOptions,
    error_hook: Option<ErrorHook>,
}

impl Inner {
    fn emit(&self, event: CacheEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn settle(&self, key: &QueryKey, generation: u64, result: Result<Value, AppError>) -> QueryResult {
        match result {
            Ok(value) => {
                let data = Arc::new(value);
                let stored = match self.entries.get_mut(key) {
                    Some(mut entry) if entry.generation == generation => {
                        entry.data = Some(data.clone());
                        entry.error = None;
                        entry.updated_at = Some(Instant::now());
                        entry.invalidated = false;
                        true
                    }
                    _ => false,
                };
                if stored {
                    tracing::debug!(key = %key, "query settled");
                    self.emit(CacheEvent::Updated(key.clone()));
                } else {
                    tracing::debug!(key = %key, generation, "discarding result of superseded query");
                }
                Ok(data)
            }
            Err(err) => {
                let notify = match self.entries.get_mut(key) {
                    Some(mut entry) if entry.generation == generation => {
                        entry.error = Some(err.clone());
                        entry.options.notify_errors
                    }
                    _ => {
                        tracing::debug!(key = %key, generation, "superseded query failed");
                        return Err(err);
                    }
                };
                tracing::warn!(key = %key, error = %err, "query failed");
                if notify {
                    if let Some(hook) = &self.error_hook {
                        hook(key, &err);
                    }
                }
                self.emit(CacheEvent::Failed(key.clone()));
                Err(err)
            }
        }
    }
}

/// Shared query cache.
///
/// One instance is built at startup and cloned into every resource; clones
/// share state. Entries are keyed by [`QueryKey`]; concurrent fetches of one
/// key share a single in-flight request, and every waiter receives the same
/// result.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(defaults: CacheOptions) -> Self {
        Self::build(defaults, None)
    }

    /// A cache that passes every failed fetch to `hook`, once per request
    /// and after retries, regardless of how many callers awaited it.
    pub fn with_error_hook(defaults: CacheOptions, hook: ErrorHook) -> Self {
        Self::build(defaults, Some(hook))
    }

    fn build(defaults: CacheOptions, error_hook: Option<ErrorHook>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                next_flight: AtomicU64::new(0),
                events,
                defaults,
                error_hook,
            }),
        }
    }

    pub fn from_settings(settings: &DataSettings) -> Self {
        Self::new(CacheOptions::from_settings(settings))
    }

    pub fn defaults(&self) -> &CacheOptions {
        &self.inner.defaults
    }

    /// Cached data when fresh, otherwise fetch through `query_fn`.
    ///
    /// On failure the entry keeps its previous data and records the error.
    pub async fn fetch(&self, key: &QueryKey, options: QueryOptions, query_fn: QueryFn) -> QueryResult {
        self.register(key, options, &query_fn);
        if let Some(data) = self.fresh_data(key) {
            tracing::trace!(key = %key, "serving fresh cache entry");
            return Ok(data);
        }
        self.start(key, query_fn).await
    }

    /// Fetch regardless of freshness. Joins a request already in flight
    /// unless it started before the entry was last invalidated.
    pub async fn fetch_now(&self, key: &QueryKey, options: QueryOptions, query_fn: QueryFn) -> QueryResult {
        self.register(key, options, &query_fn);
        self.start(key, query_fn).await
    }

    /// Refetch with the query function the entry was last fetched with.
    ///
    /// `None` when the key is unknown or was never fetched.
    pub async fn refetch(&self, key: &QueryKey) -> Option<QueryResult> {
        let query_fn = self.inner.entries.get(key)?.query_fn.clone()?;
        Some(self.start(key, query_fn).await)
    }

    fn register(&self, key: &QueryKey, options: QueryOptions, query_fn: &QueryFn) {
        self.inner
            .entries
            .entry(key.clone())
            .and_modify(|entry| {
                entry.options = options;
                entry.query_fn = Some(query_fn.clone());
            })
            .or_insert_with(|| Entry::new(options, Some(query_fn.clone())));
    }

    fn fresh_data(&self, key: &QueryKey) -> Option<Arc<Value>> {
        let entry = self.inner.entries.get(key)?;
        if entry.is_stale(Instant::now()) {
            None
        } else {
            entry.data.clone()
        }
    }

    fn start(&self, key: &QueryKey, query_fn: QueryFn) -> InFlight {
        let generation = self
            .inner
            .entries
            .get(key)
            .map_or(0, |entry| entry.generation);
        match self.inner.in_flight.entry(key.clone()) {
            Slot::Occupied(mut slot) => {
                if slot.get().generation == generation {
                    tracing::trace!(key = %key, "joining in-flight fetch");
                    return slot.get().future.clone();
                }
                tracing::debug!(key = %key, "in-flight fetch predates invalidation, fetching again");
                let flight = self.launch(key, generation, query_fn);
                slot.insert(flight.clone());
                flight.future
            }
            Slot::Vacant(slot) => {
                tracing::debug!(key = %key, "fetching");
                let flight = self.launch(key, generation, query_fn);
                slot.insert(flight.clone());
                flight.future
            }
        }
    }

    fn launch(&self, key: &QueryKey, generation: u64, query_fn: QueryFn) -> Flight {
        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let _release = FlightRelease {
                inner: inner.clone(),
                key: task_key.clone(),
                id,
            };
            let result = inner.defaults.retry.run(|| query_fn()).await;
            inner.settle(&task_key, generation, result)
        });
        let inner = self.inner.clone();
        let wait_key = key.clone();
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    let err = AppError::normalize(RawError::runtime(join_err));
                    inner.settle(&wait_key, generation, Err(err))
                }
            }
        }
        .boxed()
        .shared();
        Flight {
            id,
            generation,
            future,
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<QuerySnapshot> {
        let now = Instant::now();
        let entry = self.inner.entries.get(key)?;
        Some(QuerySnapshot {
            data: entry.data.clone(),
            error: entry.error.clone(),
            is_fetching: self.inner.in_flight.contains_key(key),
            is_stale: entry.is_stale(now),
            updated_at: entry.updated_at,
            observers: entry.observers,
        })
    }

    pub fn get_data(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.inner.entries.get(key)?.data.clone()
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Store data directly, as if it had just been fetched.
    pub fn set_data(&self, key: &QueryKey, value: Value) {
        let defaults = self.inner.defaults.query;
        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(defaults, None));
        entry.data = Some(Arc::new(value));
        entry.error = None;
        entry.updated_at = Some(Instant::now());
        entry.invalidated = false;
        entry.generation = entry.generation.wrapping_add(1);
        drop(entry);
        self.inner.emit(CacheEvent::Updated(key.clone()));
    }

    /// Mark every entry under `prefix` stale. Returns the affected keys.
    pub fn invalidate(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut keys = Vec::new();
        for mut entry in self.inner.entries.iter_mut() {
            if prefix.is_prefix_of(entry.key()) {
                entry.invalidated = true;
                entry.generation = entry.generation.wrapping_add(1);
                keys.push(entry.key().clone());
            }
        }
        tracing::debug!(prefix = %prefix, count = keys.len(), "invalidated");
        for key in &keys {
            self.inner.emit(CacheEvent::Invalidated(key.clone()));
        }
        keys
    }

    /// Invalidate everything under `prefix` and refetch the observed entries.
    ///
    /// Resolves once every refetch has settled. Unobserved entries stay stale
    /// until they are next loaded. Returns how many entries were refetched.
    pub async fn invalidate_and_refetch(&self, prefix: &QueryKey) -> usize {
        let keys = self.invalidate(prefix);
        let refetches: Vec<InFlight> = keys
            .iter()
            .filter_map(|key| {
                let query_fn = {
                    let entry = self.inner.entries.get(key)?;
                    if entry.observers == 0 {
                        return None;
                    }
                    entry.query_fn.clone()?
                };
                Some(self.start(key, query_fn))
            })
            .collect();
        let count = refetches.len();
        join_all(refetches).await;
        count
    }

    /// Register an observer of `key`; the entry is retained while any
    /// observer is alive.
    pub fn observe(&self, key: &QueryKey, options: QueryOptions) -> ObserverGuard {
        let mut entry = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(options, None));
        entry.observers += 1;
        entry.options = options;
        drop(entry);
        ObserverGuard {
            inner: self.inner.clone(),
            key: key.clone(),
        }
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.inner.entries.remove(key).is_some();
        if removed {
            self.inner.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    pub fn clear(&self) {
        let keys = self.keys();
        self.inner.entries.clear();
        for key in keys {
            self.inner.emit(CacheEvent::Removed(key));
        }
    }

    /// Remove entries that have had no observer for longer than their
    /// `gc_time`. Entries with a request in flight are kept.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut removed = Vec::new();
        self.inner.entries.retain(|key, entry| {
            let keep = !entry.is_collectable(now) || self.inner.in_flight.contains_key(key);
            if !keep {
                removed.push(key.clone());
            }
            keep
        });
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "collected idle cache entries");
        }
        let count = removed.len();
        for key in removed {
            self.inner.emit(CacheEvent::Removed(key));
        }
        count
    }

    /// Run [`collect_garbage`](Self::collect_garbage) every `interval` until
    /// `cancel` fires.
    pub fn spawn_gc(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("cache gc stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        cache.collect_garbage();
                    }
                }
            }
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entries.len())
            .field("in_flight", &self.inner.in_flight.len())
            .field("defaults", &self.inner.defaults)
            .field("error_hook", &self.inner.error_hook.is_some())
            .finish()
    }
}

/// Drops a request from the in-flight table when its task ends, including by
/// panic. A newer request for the same key is left in place.
struct FlightRelease {
    inner: Arc<Inner>,
    key: QueryKey,
    id: u64,
}

impl Drop for FlightRelease {
    fn drop(&mut self) {
        self.inner
            .in_flight
            .remove_if(&self.key, |_, flight| flight.id == self.id);
    }
}

/// Keeps an entry alive while held. Dropping the last guard starts the
/// entry's `gc_time` countdown.
pub struct ObserverGuard {
    inner: Arc<Inner>,
    key: QueryKey,
}

impl ObserverGuard {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(mut entry) = self.inner.entries.get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
            if entry.observers == 0 {
                entry.idle_since = Instant::now();
            }
        }
    }
}

impl std::fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverGuard").field("key", &self.key).finish()
    }
}
