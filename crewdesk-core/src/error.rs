use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize;

/// Closed taxonomy of failures surfaced to consumers of the data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Auth,
    Permission,
    Network,
    Validation,
    FileUpload,
    Database,
    Unknown,
}

impl ErrorKind {
    /// Severity assigned when the error is created without an explicit one.
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::Auth | ErrorKind::Permission | ErrorKind::Validation => Severity::Warning,
            ErrorKind::Network | ErrorKind::FileUpload | ErrorKind::Database | ErrorKind::Unknown => {
                Severity::Error
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::FileUpload => "file_upload",
            ErrorKind::Database => "database",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Title shown on the toast raised for this kind of error.
    pub fn toast_title(self) -> &'static str {
        match self {
            ErrorKind::Auth => "Authentication error",
            ErrorKind::Permission => "Permission denied",
            ErrorKind::Network => "Connection problem",
            ErrorKind::Validation => "Invalid input",
            ErrorKind::FileUpload => "Upload failed",
            ErrorKind::Database => "Something went wrong",
            ErrorKind::Unknown => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// Error reported by the database/REST backend.
///
/// Mirrors the wire shape `{ message, code, details, hint }` plus the HTTP
/// status the backend answered with, when known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for BackendError {}

/// Error reported by the authentication provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for AuthError {}

/// Any failure before normalization.
///
/// This is the closed set of shapes a failed backend call, auth call or
/// closure can produce. [`AppError::normalize`] accepts every variant.
#[derive(Debug)]
pub enum RawError {
    /// Already normalized; normalization returns it unchanged.
    App(AppError),
    Backend(BackendError),
    Auth(AuthError),
    Runtime(Box<dyn std::error::Error + Send + Sync>),
    Message(String),
    /// Error payload of unknown shape, classified structurally.
    Json(Value),
    Empty,
}

impl RawError {
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RawError::Runtime(Box::new(err))
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawError::App(err) => write!(f, "{err}"),
            RawError::Backend(err) => write!(f, "{err}"),
            RawError::Auth(err) => write!(f, "{err}"),
            RawError::Runtime(err) => write!(f, "{err}"),
            RawError::Message(msg) => f.write_str(msg),
            RawError::Json(value) => write!(f, "{value}"),
            RawError::Empty => f.write_str("<empty error>"),
        }
    }
}

impl std::error::Error for RawError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RawError::Runtime(err) => Some(err.as_ref()),
            RawError::Backend(err) => Some(err),
            RawError::Auth(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AppError> for RawError {
    fn from(err: AppError) -> Self {
        RawError::App(err)
    }
}

impl From<BackendError> for RawError {
    fn from(err: BackendError) -> Self {
        RawError::Backend(err)
    }
}

impl From<AuthError> for RawError {
    fn from(err: AuthError) -> Self {
        RawError::Auth(err)
    }
}

impl From<String> for RawError {
    fn from(msg: String) -> Self {
        RawError::Message(msg)
    }
}

impl From<&str> for RawError {
    fn from(msg: &str) -> Self {
        RawError::Message(msg.to_string())
    }
}

impl From<Value> for RawError {
    fn from(value: Value) -> Self {
        RawError::Json(value)
    }
}

impl From<Option<Value>> for RawError {
    fn from(value: Option<Value>) -> Self {
        value.map_or(RawError::Empty, RawError::Json)
    }
}

impl From<serde_json::Error> for RawError {
    fn from(err: serde_json::Error) -> Self {
        RawError::runtime(err)
    }
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        RawError::runtime(err)
    }
}

/// Normalized application error.
///
/// Created once at the boundary where a backend call fails and never mutated
/// afterwards; `with_*` builders consume and return a new value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppError {
    kind: ErrorKind,
    severity: Severity,
    message: String,
    technical: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Value>,
    #[serde(skip)]
    original: Option<Arc<RawError>>,
    timestamp: DateTime<Utc>,
}

impl AppError {
    /// Build an error directly; the message doubles as the technical message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            severity: kind.default_severity(),
            technical: message.clone(),
            message,
            status: None,
            code: None,
            operation: None,
            context: None,
            original: None,
            timestamp: Utc::now(),
        }
    }

    /// Normalize any raw failure. Total: every input yields exactly one error.
    pub fn normalize(raw: impl Into<RawError>) -> Self {
        normalize::normalize(raw.into())
    }

    /// Normalize and tag with the operation that failed (`"fetching jobs"`).
    ///
    /// An already-normalized error keeps its original operation if it has one.
    pub fn transform(raw: impl Into<RawError>, operation: impl Into<String>) -> Self {
        let mut err = Self::normalize(raw);
        if err.operation.is_none() {
            err.operation = Some(operation.into());
        }
        err
    }

    pub(crate) fn from_parts(
        kind: ErrorKind,
        message: String,
        technical: String,
        status: Option<u16>,
        code: Option<String>,
        original: RawError,
    ) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message,
            technical,
            status,
            code,
            operation: None,
            context: None,
            original: Some(Arc::new(original)),
            timestamp: Utc::now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// User-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw message as produced by the failing component.
    pub fn technical(&self) -> &str {
        &self.technical
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn original(&self) -> Option<&RawError> {
        self.original.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Client-class failures (auth, permission, validation, rejected uploads,
    /// any 4xx status) are never retried.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::Auth | ErrorKind::Permission | ErrorKind::Validation | ErrorKind::FileUpload => {
                false
            }
            ErrorKind::Network | ErrorKind::Database | ErrorKind::Unknown => {
                !matches!(self.status, Some(400..=499))
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "[{}] {} ({op})", self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.original
            .as_deref()
            .map(|raw| raw as &(dyn std::error::Error + 'static))
    }
}
