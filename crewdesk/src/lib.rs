//! crewdesk: cached, error-normalizing data access for the job dashboard.
//!
//! This facade re-exports the crewdesk crates behind feature flags:
//!
//! ```ignore
//! use crewdesk::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature   | Default | Crate              |
//! |-----------|---------|--------------------|
//! | `loading` | **yes** | `crewdesk-loading` |
//! | `domain`  | **yes** | `crewdesk-domain`  |
//! | `full`    | no      | All of the above   |
//!
//! `crewdesk-core`, `crewdesk-cache` and `crewdesk-data` are always present.

pub extern crate crewdesk_cache;
pub extern crate crewdesk_core;
pub extern crate crewdesk_data;

pub use crewdesk_core::*;

pub use crewdesk_cache as cache;
pub use crewdesk_data as data;

#[cfg(feature = "loading")]
pub use crewdesk_loading as loading;

#[cfg(feature = "domain")]
pub use crewdesk_domain as domain;

/// Unified prelude: `use crewdesk::prelude::*`.
pub mod prelude {
    pub use crewdesk_core::prelude::*;
    pub use crewdesk_data::prelude::*;
    pub use crewdesk_data::{InMemoryBackend, ItemHandle, ListHandle};

    #[cfg(feature = "loading")]
    pub use crewdesk_loading::prelude::*;

    #[cfg(feature = "domain")]
    pub use crewdesk_domain::prelude::*;
}
