use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crewdesk_cache::{CacheOptions, ErrorHook, QueryCache};
use crewdesk_core::{
    ConfigError, CrewdeskConfig, DataSettings, ErrorReporter, Navigator, NoopNavigator, Notifier,
    ReportOptions, TracingNotifier,
};

use crate::backend::Backend;
use crate::client::DataClient;
use crate::crud::{CrudConfig, CrudResource};
use crate::entity::Entity;
use crate::item::{ItemConfig, ItemResource};

/// The shared pieces every resource works through: one data client, one
/// query cache, one set of settings.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct DataLayer {
    client: DataClient,
    cache: QueryCache,
    settings: Arc<DataSettings>,
}

impl DataLayer {
    pub fn builder(backend: impl Backend) -> DataLayerBuilder {
        DataLayerBuilder::new(Arc::new(backend))
    }

    /// A layer with default settings that reports to the log only.
    pub fn new(backend: impl Backend) -> Self {
        Self::builder(backend).build()
    }

    pub fn client(&self) -> &DataClient {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn settings(&self) -> &DataSettings {
        &self.settings
    }

    pub fn reporter(&self) -> &ErrorReporter {
        self.client.reporter()
    }

    pub fn crud<E: Entity>(&self, config: CrudConfig) -> CrudResource<E> {
        CrudResource::new(self, config)
    }

    pub fn item<E: Entity>(&self, config: ItemConfig) -> ItemResource<E> {
        ItemResource::new(self, config)
    }

    /// Evict unobserved entries past their gc time every `interval` until
    /// `cancel` fires.
    pub fn spawn_gc(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        self.cache.spawn_gc(interval, cancel)
    }
}

impl std::fmt::Debug for DataLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("client", &self.client)
            .field("entries", &self.cache.len())
            .finish()
    }
}

pub struct DataLayerBuilder {
    backend: Arc<dyn Backend>,
    settings: DataSettings,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
}

impl DataLayerBuilder {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            settings: DataSettings::default(),
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(NoopNavigator),
        }
    }

    pub fn settings(mut self, settings: DataSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Read [`DataSettings`] from loaded configuration.
    pub fn config(mut self, config: &CrewdeskConfig) -> Result<Self, ConfigError> {
        self.settings = config.section::<DataSettings>()?;
        Ok(self)
    }

    pub fn notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn navigator(mut self, navigator: impl Navigator) -> Self {
        self.navigator = Arc::new(navigator);
        self
    }

    pub fn build(self) -> DataLayer {
        let settings = self.settings;
        let reporter = ErrorReporter::new(self.notifier, self.navigator)
            .with_login_path(settings.login_path.clone());

        // Cached fetches are reported here, once per request after retries.
        let hook_reporter = reporter.clone();
        let report = ReportOptions {
            show_toast: settings.notify_errors,
            redirect_on_auth: true,
        };
        let hook: ErrorHook = Arc::new(move |key, err| {
            tracing::debug!(key = %key, "cached query failed");
            hook_reporter.report(err, report);
        });
        let cache = QueryCache::with_error_hook(CacheOptions::from_settings(&settings), hook);

        let client = DataClient::new(self.backend, reporter)
            .with_mutation_retry(settings.mutation_retry.into());

        tracing::debug!(
            stale_time_ms = settings.stale_time.as_millis() as u64,
            gc_time_ms = settings.gc_time.as_millis() as u64,
            query_retries = settings.query_retry.max_retries,
            mutation_retries = settings.mutation_retry.max_retries,
            "data layer ready"
        );

        DataLayer {
            client,
            cache,
            settings: Arc::new(settings),
        }
    }
}
