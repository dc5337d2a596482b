use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crewdesk_cache::RetryPolicy;
use crewdesk_core::{camelize, AppError, ErrorKind, ErrorReporter, RawError, ReportOptions};

use crate::backend::Backend;

/// Result of one data-client call: exactly one of `data` and `error` is set.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub data: Option<T>,
    pub error: Option<AppError>,
}

impl<T> Outcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: AppError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<T, AppError> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(AppError::normalize(RawError::Empty)),
        }
    }
}

impl<T> From<Result<T, AppError>> for Outcome<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Outcome::ok(data),
            Err(error) => Outcome::err(error),
        }
    }
}

/// Per-call settings.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Operation tag attached to errors, e.g. `"fetching jobs"`.
    pub operation: Option<String>,
    /// How failures are reported; `None` leaves reporting to the caller.
    pub report: Option<ReportOptions>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            operation: None,
            report: Some(ReportOptions::default()),
        }
    }
}

impl CallOptions {
    pub fn operation(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    /// Log failures without raising a toast or redirecting.
    pub fn silent(mut self) -> Self {
        self.report = Some(ReportOptions::silent());
        self
    }

    /// Return failures without reporting them.
    pub fn deferred(mut self) -> Self {
        self.report = None;
        self
    }

    pub fn with_report(mut self, report: ReportOptions) -> Self {
        self.report = Some(report);
        self
    }
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wraps every backend call: counts calls in flight, converts payload keys to
/// camelCase, and turns failures (including panics) into a reported
/// [`AppError`].
///
/// `query` makes a single attempt; cached queries are retried by the query
/// cache. `mutate` retries with the mutation policy.
#[derive(Clone)]
pub struct DataClient {
    backend: Arc<dyn Backend>,
    reporter: ErrorReporter,
    in_flight: Arc<AtomicUsize>,
    mutation_retry: RetryPolicy,
}

impl DataClient {
    pub fn new(backend: Arc<dyn Backend>, reporter: ErrorReporter) -> Self {
        Self {
            backend,
            reporter,
            in_flight: Arc::new(AtomicUsize::new(0)),
            mutation_retry: RetryPolicy::mutations(),
        }
    }

    pub fn with_mutation_retry(mut self, policy: RetryPolicy) -> Self {
        self.mutation_retry = policy;
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Whether any call is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn query<F, Fut>(&self, f: F) -> Outcome<Value>
    where
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        self.query_with(CallOptions::default(), f).await
    }

    pub async fn query_with<F, Fut>(&self, options: CallOptions, f: F) -> Outcome<Value>
    where
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        self.run(options, RetryPolicy::none(), f).await
    }

    pub async fn mutate<F, Fut>(&self, f: F) -> Outcome<Value>
    where
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        self.mutate_with(CallOptions::default(), f).await
    }

    pub async fn mutate_with<F, Fut>(&self, options: CallOptions, f: F) -> Outcome<Value>
    where
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        self.run(options, self.mutation_retry, f).await
    }

    /// [`query`](Self::query), deserialized into `T`.
    pub async fn query_as<T, F, Fut>(&self, f: F) -> Outcome<T>
    where
        T: DeserializeOwned,
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        let options = CallOptions::default();
        let outcome = self.run(options.clone(), RetryPolicy::none(), f).await;
        self.decode_outcome(outcome, &options)
    }

    /// [`mutate`](Self::mutate), deserialized into `T`.
    pub async fn mutate_as<T, F, Fut>(&self, f: F) -> Outcome<T>
    where
        T: DeserializeOwned,
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        let options = CallOptions::default();
        let outcome = self.run(options.clone(), self.mutation_retry, f).await;
        self.decode_outcome(outcome, &options)
    }

    fn decode_outcome<T: DeserializeOwned>(&self, outcome: Outcome<Value>, options: &CallOptions) -> Outcome<T> {
        let data = match outcome.into_result() {
            Ok(data) => data,
            Err(err) => return Outcome::err(err),
        };
        match decode(data, options.operation.as_deref()) {
            Ok(value) => Outcome::ok(value),
            Err(err) => {
                self.surface(&err, options);
                Outcome::err(err)
            }
        }
    }

    async fn run<F, Fut>(&self, options: CallOptions, policy: RetryPolicy, mut f: F) -> Outcome<Value>
    where
        F: FnMut(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<Value, RawError>>,
    {
        let _guard = LoadingGuard::enter(&self.in_flight);
        let operation = options.operation.clone();

        let result = policy
            .run(|| {
                let backend = self.backend.clone();
                let started = std::panic::catch_unwind(AssertUnwindSafe(|| f(backend)));
                let operation = operation.clone();
                async move {
                    let outcome = match started {
                        Ok(call) => AssertUnwindSafe(call).catch_unwind().await,
                        Err(panic) => Err(panic),
                    };
                    let raw = match outcome {
                        Ok(Ok(value)) => return Ok(value),
                        Ok(Err(raw)) => raw,
                        Err(panic) => panic_to_raw(panic),
                    };
                    Err(match operation {
                        Some(op) => AppError::transform(raw, op),
                        None => AppError::normalize(raw),
                    })
                }
            })
            .await;

        match result {
            Ok(value) => Outcome::ok(camelize(value)),
            Err(err) => {
                self.surface(&err, &options);
                Outcome::err(err)
            }
        }
    }

    fn surface(&self, err: &AppError, options: &CallOptions) {
        match options.report {
            Some(report) => self.reporter.report(err, report),
            None => tracing::debug!(error = %err, "backend call failed, reporting deferred"),
        }
    }
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("in_flight", &self.in_flight())
            .field("mutation_retry", &self.mutation_retry)
            .finish_non_exhaustive()
    }
}

/// Deserialize a camelized payload. A shape mismatch is a validation error.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, operation: Option<&str>) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|err| {
        let app = AppError::new(
            ErrorKind::Validation,
            "The server returned data in an unexpected format.",
        )
        .with_context(json!({ "detail": err.to_string() }));
        match operation {
            Some(op) => app.with_operation(op),
            None => app,
        }
    })
}

fn panic_to_raw(panic: Box<dyn Any + Send>) -> RawError {
    let message = if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::new()
    };
    tracing::error!(panic = %message, "backend call panicked");
    if message.is_empty() {
        RawError::Empty
    } else {
        RawError::Message(message)
    }
}
