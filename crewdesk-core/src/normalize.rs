//! Structural classification of raw failures into [`AppError`].

use serde_json::Value;

use crate::error::{AppError, AuthError, BackendError, ErrorKind, RawError, Severity};

/// Message used when a failure carries no message at all.
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred. Please try again.";

const PERMISSION_PHRASES: &[&str] = &[
    "row-level security",
    "row level security",
    "permission denied",
    "not authorized",
    "insufficient privilege",
];

const VALIDATION_PHRASES: &[&str] = &[
    "not-null constraint",
    "null value in column",
    "check constraint",
    "invalid input syntax",
    "value too long",
];

const SESSION_PHRASES: &[&str] = &["jwt expired", "invalid jwt", "jwt malformed"];

const NETWORK_PHRASES: &[&str] = &[
    "failed to fetch",
    "fetch failed",
    "networkerror",
    "network error",
    "network request failed",
    "connection refused",
    "connection reset",
    "timed out",
];

const FILE_UPLOAD_PHRASES: &[&str] = &[
    "storage",
    "bucket",
    "file size",
    "file too large",
    "exceeded the maximum allowed size",
    "payload too large",
    "mime type",
    "file type",
];

const PERMISSION_CODES: &[&str] = &["42501"];
const VALIDATION_CODES: &[&str] = &["23502", "23514", "22P02", "22001"];

/// Technical substrings and the text shown to the user instead.
///
/// Matched case-insensitively in order; the first hit wins.
const FRIENDLY_MESSAGES: &[(&str, &str)] = &[
    ("invalid login credentials", "The email or password you entered is incorrect."),
    ("email not confirmed", "Please confirm your email address before signing in."),
    ("user already registered", "An account with this email already exists."),
    ("jwt expired", "Your session has expired. Please sign in again."),
    ("refresh token", "Your session has expired. Please sign in again."),
    ("row-level security", "You don't have permission to perform this action."),
    ("permission denied", "You don't have permission to perform this action."),
    ("duplicate key value", "This record already exists."),
    ("foreign key constraint", "This record is linked to other data and cannot be changed."),
    ("not-null constraint", "A required field is missing."),
    ("null value in column", "A required field is missing."),
    ("check constraint", "One of the values provided is not allowed."),
    ("invalid input syntax", "One of the values provided has the wrong format."),
    ("multiple (or no) rows returned", "The requested record could not be found."),
    ("failed to fetch", "Unable to reach the server. Check your connection and try again."),
    ("networkerror", "Unable to reach the server. Check your connection and try again."),
    ("timed out", "The server took too long to respond. Please try again."),
    ("exceeded the maximum allowed size", "The file is too large to upload."),
    ("mime type", "This file type is not supported."),
];

pub(crate) fn normalize(raw: RawError) -> AppError {
    match raw {
        RawError::App(err) => err,
        RawError::Backend(err) => from_backend(err.clone(), RawError::Backend(err)),
        RawError::Auth(err) => from_auth(err.clone(), RawError::Auth(err)),
        RawError::Runtime(err) => {
            let message = err.to_string();
            from_message(message, RawError::Runtime(err))
        }
        RawError::Message(msg) => from_message(msg.clone(), RawError::Message(msg)),
        RawError::Json(value) => from_json(value),
        RawError::Empty => AppError::from_parts(
            ErrorKind::Unknown,
            FALLBACK_MESSAGE.to_string(),
            String::new(),
            None,
            None,
            RawError::Empty,
        ),
    }
}

/// Friendly text for a technical message.
///
/// Falls back to the message itself, then to [`FALLBACK_MESSAGE`].
pub fn friendly_message(technical: &str) -> String {
    let lowered = technical.to_lowercase();
    FRIENDLY_MESSAGES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, text)| (*text).to_string())
        .unwrap_or_else(|| {
            if technical.trim().is_empty() {
                FALLBACK_MESSAGE.to_string()
            } else {
                technical.to_string()
            }
        })
}

/// Classify a bare message (runtime errors and strings).
pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    if contains_any(&lowered, NETWORK_PHRASES) {
        ErrorKind::Network
    } else if contains_any(&lowered, FILE_UPLOAD_PHRASES) {
        ErrorKind::FileUpload
    } else {
        ErrorKind::Unknown
    }
}

/// Classify a backend error: database by default, refined by message or code.
pub fn classify_backend(err: &BackendError) -> ErrorKind {
    let mut haystack = err.message.to_lowercase();
    for extra in [&err.details, &err.hint].into_iter().flatten() {
        haystack.push(' ');
        haystack.push_str(&extra.to_lowercase());
    }
    let code = err.code.as_deref().unwrap_or_default();

    if contains_any(&haystack, SESSION_PHRASES) {
        ErrorKind::Auth
    } else if PERMISSION_CODES.contains(&code) || contains_any(&haystack, PERMISSION_PHRASES) {
        ErrorKind::Permission
    } else if VALIDATION_CODES.contains(&code) || contains_any(&haystack, VALIDATION_PHRASES) {
        ErrorKind::Validation
    } else {
        ErrorKind::Database
    }
}

fn from_backend(err: BackendError, original: RawError) -> AppError {
    let kind = classify_backend(&err);
    let message = friendly_message(&err.message);
    AppError::from_parts(kind, message, err.message, err.status, err.code, original)
}

fn from_auth(err: AuthError, original: RawError) -> AppError {
    let message = friendly_message(&err.message);
    AppError::from_parts(ErrorKind::Auth, message, err.message, err.status, err.code, original)
}

fn from_message(technical: String, original: RawError) -> AppError {
    let kind = classify_message(&technical);
    let message = friendly_message(&technical);
    AppError::from_parts(kind, message, technical, None, None, original)
}

fn from_json(value: Value) -> AppError {
    match &value {
        Value::Null => normalize(RawError::Empty),
        Value::String(msg) => {
            let technical = msg.clone();
            from_message(technical, RawError::Json(value))
        }
        Value::Object(map) => {
            let message = map
                .get("message")
                .or_else(|| map.get("error_description"))
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let status = map
                .get("status")
                .or_else(|| map.get("statusCode"))
                .and_then(status_of);
            let code = map.get("code").and_then(code_of);

            if is_auth_shaped(map) {
                let err = AuthError {
                    message,
                    status,
                    code,
                };
                from_auth(err, RawError::Json(value))
            } else if ["details", "hint", "code"].iter().any(|k| map.contains_key(*k)) {
                let err = BackendError {
                    message,
                    code,
                    details: map.get("details").and_then(Value::as_str).map(str::to_string),
                    hint: map.get("hint").and_then(Value::as_str).map(str::to_string),
                    status,
                };
                from_backend(err, RawError::Json(value))
            } else {
                let mut err = from_message(message, RawError::Json(value));
                if let Some(status) = status {
                    err = err.with_status(status);
                }
                err
            }
        }
        _ => {
            let technical = value.to_string();
            AppError::from_parts(
                ErrorKind::Unknown,
                FALLBACK_MESSAGE.to_string(),
                technical,
                None,
                None,
                RawError::Json(value),
            )
        }
    }
}

fn is_auth_shaped(map: &serde_json::Map<String, Value>) -> bool {
    let flagged = map
        .get("__isAuthError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let named = map
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| name.contains("AuthError") || name.contains("AuthApiError"));
    flagged || named
}

fn status_of(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn code_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Emit the full diagnostic payload of an error as one `tracing` event.
///
/// Kept apart from classification so that normalizing never has side effects.
pub fn log_error(err: &AppError) {
    let original = err.original().map(|raw| raw.to_string());
    let context = err.context().map(|ctx| ctx.to_string());

    macro_rules! emit {
        ($level:ident) => {
            tracing::$level!(
                kind = err.kind().as_str(),
                severity = err.severity().as_str(),
                operation = err.operation(),
                status = err.status(),
                code = err.code(),
                context = context.as_deref(),
                original = original.as_deref(),
                timestamp = %err.timestamp(),
                "{}",
                err.technical()
            )
        };
    }

    match err.severity() {
        Severity::Info => emit!(info),
        Severity::Warning => emit!(warn),
        Severity::Error | Severity::Critical => emit!(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_message_lookup_is_case_insensitive() {
        assert_eq!(
            friendly_message("Invalid login credentials"),
            "The email or password you entered is incorrect."
        );
        assert_eq!(
            friendly_message("TypeError: Failed to fetch"),
            "Unable to reach the server. Check your connection and try again."
        );
    }

    #[test]
    fn test_friendly_message_falls_back() {
        assert_eq!(friendly_message("boom"), "boom");
        assert_eq!(friendly_message("   "), FALLBACK_MESSAGE);
    }

    #[test]
    fn test_classify_backend_by_code() {
        let err = BackendError::new("denied").with_code("42501");
        assert_eq!(classify_backend(&err), ErrorKind::Permission);
        let err = BackendError::new("bad value").with_code("23514");
        assert_eq!(classify_backend(&err), ErrorKind::Validation);
        let err = BackendError::new("deadlock detected").with_code("40P01");
        assert_eq!(classify_backend(&err), ErrorKind::Database);
    }

    #[test]
    fn test_classify_backend_uses_details_and_hint() {
        let err = BackendError::new("insert failed")
            .with_details("Failing row violates not-null constraint");
        assert_eq!(classify_backend(&err), ErrorKind::Validation);
    }

    #[test]
    fn test_expired_session_is_auth() {
        let err = BackendError::new("JWT expired").with_code("PGRST301");
        assert_eq!(classify_backend(&err), ErrorKind::Auth);
    }
}
