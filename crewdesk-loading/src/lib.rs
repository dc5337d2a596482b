//! Loading indicator for data handles.
//!
//! [`SmartLoading`] turns the raw `is_loading` / `is_fetching` / `has_data`
//! flags of a handle into a [`LoadingSignal`]: a spinner for slow first loads,
//! nothing for fast responses, and nothing for background refetches unless
//! asked for.
//!
//! ```no_run
//! use crewdesk_loading::{LoadingInputs, LoadingOptions, SmartLoading};
//!
//! # async fn demo() {
//! let loading = SmartLoading::new(LoadingOptions::default());
//! let signal = loading.update(LoadingInputs::new(true, true, false));
//! assert!(signal.is_initial_load);
//! assert!(!signal.should_show_loading);
//! # }
//! ```

pub mod options;
pub mod smart;

pub use options::{LoadingInputs, LoadingOptions, DEFAULT_LOADING_DELAY};
pub use smart::{LoadingPhase, LoadingSignal, SmartLoading};

pub mod prelude {
    //! Re-exports of the most commonly used loading types.
    pub use crate::{LoadingInputs, LoadingOptions, LoadingSignal, SmartLoading};
}
