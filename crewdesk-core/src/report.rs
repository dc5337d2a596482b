use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::{AppError, ErrorKind, Severity};
use crate::normalize::log_error;

/// Default route users are sent to when their session is no longer valid.
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Default,
    Destructive,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    /// The toast raised for a normalized error.
    pub fn for_error(err: &AppError) -> Self {
        let variant = match err.severity() {
            Severity::Info => ToastVariant::Default,
            Severity::Warning | Severity::Error | Severity::Critical => ToastVariant::Destructive,
        };
        Self {
            title: err.kind().toast_title().to_string(),
            description: err.message().to_string(),
            variant,
        }
    }
}

/// Toast sink. Calls are fire-and-forget.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, toast: Toast);
}

/// Navigation sink used for the redirect-to-login side effect.
pub trait Navigator: Send + Sync + 'static {
    fn redirect(&self, path: &str);
}

/// Notifier that only writes toasts to the log. Useful for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        tracing::info!(
            title = %toast.title,
            variant = ?toast.variant,
            "toast: {}",
            toast.description
        );
    }
}

/// Notifier that keeps every toast in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    toasts: Arc<Mutex<Vec<Toast>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toasts raised so far, oldest first.
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect(&self, path: &str) {
        tracing::debug!(path, "redirect requested without a navigator");
    }
}

/// Navigator that keeps every requested path in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    paths: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_string());
    }
}

/// Per-call switches for [`ErrorReporter::report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub show_toast: bool,
    pub redirect_on_auth: bool,
}

impl ReportOptions {
    /// Log only: no toast, no redirect.
    pub fn silent() -> Self {
        Self {
            show_toast: false,
            redirect_on_auth: false,
        }
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            show_toast: true,
            redirect_on_auth: true,
        }
    }
}

/// Surfaces normalized errors: one log event, at most one toast, and a
/// redirect to the login page for auth failures.
#[derive(Clone)]
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
}

impl ErrorReporter {
    pub fn new(notifier: Arc<dyn Notifier>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            notifier,
            navigator,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    /// Reporter that logs toasts and ignores redirects.
    pub fn tracing_only() -> Self {
        Self::new(Arc::new(TracingNotifier), Arc::new(NoopNavigator))
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn report(&self, err: &AppError, options: ReportOptions) {
        log_error(err);
        if options.show_toast {
            self.notifier.notify(Toast::for_error(err));
        }
        if options.redirect_on_auth && err.kind() == ErrorKind::Auth {
            self.navigator.redirect(&self.login_path);
        }
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}
