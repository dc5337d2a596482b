use std::time::Duration;

use super::{ConfigError, ConfigSection, CrewdeskConfig};
use crate::report::DEFAULT_LOGIN_PATH;

/// Retry budget for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetrySettings {
    pub fn queries() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn mutations() -> Self {
        Self {
            max_retries: 1,
            ..Self::queries()
        }
    }
}

/// Smart-loading defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingSettings {
    pub delay: Duration,
    pub show_background_refetch: bool,
}

impl Default for LoadingSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            show_background_refetch: false,
        }
    }
}

/// Settings of the data layer, read from the `query.*`, `mutation.*`,
/// `loading.*` and `auth.*` keys.
///
/// ```yaml
/// query:
///   stale_time_ms: 300000
///   gc_time_ms: 600000
///   retry:
///     max: 3
///     base_delay_ms: 1000
///     max_delay_ms: 30000
/// mutation:
///   retry:
///     max: 1
/// loading:
///   delay_ms: 200
///   show_background_refetch: false
/// auth:
///   login_path: /auth/login
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSettings {
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub query_retry: RetrySettings,
    pub mutation_retry: RetrySettings,
    pub loading: LoadingSettings,
    pub login_path: String,
    /// Raise a toast for every failed request.
    pub notify_errors: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            query_retry: RetrySettings::queries(),
            mutation_retry: RetrySettings::mutations(),
            loading: LoadingSettings::default(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            notify_errors: true,
        }
    }
}

fn retry_from_config(
    config: &CrewdeskConfig,
    prefix: &str,
    defaults: RetrySettings,
) -> Result<RetrySettings, ConfigError> {
    let settings = RetrySettings {
        max_retries: config
            .get_optional(&format!("{prefix}.retry.max"))?
            .unwrap_or(defaults.max_retries),
        base_delay: config
            .get_optional(&format!("{prefix}.retry.base_delay_ms"))?
            .unwrap_or(defaults.base_delay),
        max_delay: config
            .get_optional(&format!("{prefix}.retry.max_delay_ms"))?
            .unwrap_or(defaults.max_delay),
    };
    if settings.base_delay > settings.max_delay {
        return Err(ConfigError::Invalid {
            key: format!("{prefix}.retry.base_delay_ms"),
            message: "must not exceed max_delay_ms".to_string(),
        });
    }
    Ok(settings)
}

impl ConfigSection for DataSettings {
    fn from_config(config: &CrewdeskConfig) -> Result<Self, ConfigError> {
        let defaults = DataSettings::default();
        let login_path: String = config
            .get_optional("auth.login_path")?
            .unwrap_or(defaults.login_path);
        if !login_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "auth.login_path".to_string(),
                message: format!("'{login_path}' is not an absolute path"),
            });
        }

        Ok(Self {
            stale_time: config
                .get_optional("query.stale_time_ms")?
                .unwrap_or(defaults.stale_time),
            gc_time: config
                .get_optional("query.gc_time_ms")?
                .unwrap_or(defaults.gc_time),
            query_retry: retry_from_config(config, "query", defaults.query_retry)?,
            mutation_retry: retry_from_config(config, "mutation", defaults.mutation_retry)?,
            loading: LoadingSettings {
                delay: config
                    .get_optional("loading.delay_ms")?
                    .unwrap_or(defaults.loading.delay),
                show_background_refetch: config
                    .get_optional("loading.show_background_refetch")?
                    .unwrap_or(defaults.loading.show_background_refetch),
            },
            login_path,
            notify_errors: config
                .get_optional("query.notify_errors")?
                .unwrap_or(defaults.notify_errors),
        })
    }
}
