//! Query keys and the shared query cache.
//!
//! [`QueryKeys`] derives hierarchical [`QueryKey`]s for an entity;
//! [`QueryCache`] stores fetched payloads under those keys with staleness,
//! in-flight deduplication, prefix invalidation and idle-entry collection.

pub mod cache;
pub mod key;
pub mod retry;

pub use cache::{
    query_fn, CacheEvent, CacheOptions, ErrorHook, ObserverGuard, QueryCache, QueryFn, QueryOptions,
    QueryResult, QuerySnapshot,
};
pub use key::{FilterSet, FilterValue, KeySegment, ListWindow, OrderBy, QueryKey, QueryKeys};
pub use retry::RetryPolicy;
