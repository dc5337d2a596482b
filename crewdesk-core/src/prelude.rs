//! Re-exports of the most commonly used core types.

pub use crate::config::{ConfigSection, CrewdeskConfig, DataSettings};
pub use crate::error::{AppError, ErrorKind, RawError, Severity};
pub use crate::report::{ErrorReporter, Navigator, Notifier, ReportOptions, Toast};
pub use crate::{camelize, decamelize, format_relative_date};
