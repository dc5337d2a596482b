use std::time::Duration;

use crewdesk_core::config::LoadingSettings;
use crewdesk_data::{ItemState, ListState};

/// Default time a loading condition must hold before the indicator shows.
pub const DEFAULT_LOADING_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingOptions {
    /// Whether the wrapped state belongs to a data query. Only data queries
    /// have an initial load.
    pub is_data_query: bool,
    pub loading_delay: Duration,
    /// Also show the indicator while cached data is being refetched.
    pub show_background_refetch: bool,
}

impl Default for LoadingOptions {
    fn default() -> Self {
        Self {
            is_data_query: true,
            loading_delay: DEFAULT_LOADING_DELAY,
            show_background_refetch: false,
        }
    }
}

impl LoadingOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.loading_delay = delay;
        self
    }

    pub fn with_background_refetch(mut self, show: bool) -> Self {
        self.show_background_refetch = show;
        self
    }

    pub fn not_a_data_query(mut self) -> Self {
        self.is_data_query = false;
        self
    }
}

impl From<LoadingSettings> for LoadingOptions {
    fn from(settings: LoadingSettings) -> Self {
        Self {
            is_data_query: true,
            loading_delay: settings.delay,
            show_background_refetch: settings.show_background_refetch,
        }
    }
}

/// The raw flags of a query, as reported by its handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingInputs {
    pub is_loading: bool,
    pub is_fetching: bool,
    pub has_data: bool,
}

impl LoadingInputs {
    pub fn new(is_loading: bool, is_fetching: bool, has_data: bool) -> Self {
        Self {
            is_loading,
            is_fetching,
            has_data,
        }
    }
}

impl<E> From<&ListState<E>> for LoadingInputs {
    fn from(state: &ListState<E>) -> Self {
        Self::new(state.is_loading, state.is_fetching, state.has_data)
    }
}

impl<E> From<&ItemState<E>> for LoadingInputs {
    fn from(state: &ItemState<E>) -> Self {
        Self::new(state.is_loading, state.is_fetching, state.data.is_some())
    }
}
