//! Data access for crewdesk.
//!
//! A [`DataLayer`] bundles a [`Backend`], the [`DataClient`] that wraps every
//! backend call, and the shared query cache. Resources are built on top of it:
//!
//! - [`CrudResource`]: cached lists plus create/update/delete with automatic
//!   invalidation of the entity's keys.
//! - [`ItemResource`]: cached single records by id.
//!
//! [`InMemoryBackend`] implements [`Backend`] for tests and local runs.

pub mod backend;
pub mod client;
pub mod crud;
pub mod entity;
pub mod item;
pub mod layer;
pub mod memory;
pub mod query;

pub use backend::{Backend, BackendFuture};
pub use client::{CallOptions, DataClient, Outcome};
pub use crud::{
    CrudConfig, CrudResource, ListHandle, ListOptions, ListState, DEFAULT_PAGE_SIZE,
    DEFAULT_RELATION_FIELDS,
};
pub use entity::Entity;
pub use item::{ItemConfig, ItemHandle, ItemResource, ItemState, KeyRoot};
pub use layer::{DataLayer, DataLayerBuilder};
pub use memory::{InMemoryBackend, Operation};
pub use query::{Filter, QueryError, SelectQuery};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        CrudConfig, CrudResource, DataClient, DataLayer, Entity, ItemConfig, ItemResource,
        ListOptions, Outcome,
    };
    pub use crewdesk_cache::{FilterSet, OrderBy, QueryKeys};
}
