//! Core types shared by every crewdesk crate.
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`error`]       | `AppError` taxonomy and the raw error shapes it normalizes |
//! | [`normalize`]   | structural classification, friendly messages, `log_error`  |
//! | [`report`]      | toasts, redirects and the `ErrorReporter`                  |
//! | [`case`]        | snake_case <-> camelCase conversion of JSON payloads       |
//! | [`format`]      | relative-date formatting                                   |
//! | [`config`]      | YAML/env configuration and typed `DataSettings`            |

pub mod case;
pub mod config;
pub mod error;
pub mod format;
pub mod normalize;
pub mod prelude;
pub mod report;
pub mod tracing_setup;

pub use case::{camelize, decamelize, to_camel_case, to_snake_case};
pub use config::{ConfigError, ConfigSection, ConfigValue, CrewdeskConfig, DataSettings};
pub use error::{AppError, AuthError, BackendError, ErrorKind, RawError, Severity};
pub use format::{format_date, format_relative_date, format_relative_date_now};
pub use normalize::{log_error, FALLBACK_MESSAGE};
pub use report::{
    ErrorReporter, Navigator, NoopNavigator, Notifier, RecordingNavigator, RecordingNotifier,
    ReportOptions, Toast, ToastVariant, TracingNotifier,
};
pub use tracing_setup::{init_tracing, init_tracing_with, LogFormat};
