mod loader;
pub mod secrets;
pub mod settings;
pub mod value;

use std::collections::HashMap;
use std::path::Path;

pub use secrets::{DefaultSecretResolver, SecretResolver};
pub use settings::{DataSettings, LoadingSettings, RetrySettings};
pub use value::{ConfigValue, FromConfigValue};

/// File stem of the YAML configuration files (`crewdesk.yaml`,
/// `crewdesk-{profile}.yaml`).
pub const CONFIG_FILE_STEM: &str = "crewdesk";

/// Environment variables starting with this prefix override file values.
pub const ENV_PREFIX: &str = "CREWDESK_";

/// Environment variable selecting the active profile.
pub const PROFILE_ENV: &str = "CREWDESK_PROFILE";

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found in the configuration.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// The value converted but is outside the accepted range.
    Invalid { key: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch {
                key,
                expected,
                found,
            } => write!(f, "Config type mismatch for '{key}': expected {expected}, found {found}"),
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, message } => {
                write!(f, "Invalid config value for '{key}': {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A typed view over part of the configuration.
pub trait ConfigSection: Sized {
    fn from_config(config: &CrewdeskConfig) -> Result<Self, ConfigError>;
}

/// Configuration loaded from YAML files, `.env` files and environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `crewdesk.yaml`
/// 2. `crewdesk-{profile}.yaml`
/// 3. `.env` then `.env.{profile}` (loaded into the process environment,
///    never overwriting variables that are already set)
/// 4. `${...}` placeholders in string values
/// 5. `CREWDESK_*` environment variables (`CREWDESK_QUERY__GC_TIME_MS`
///    overrides `query.gc_time_ms`)
///
/// The profile is `CREWDESK_PROFILE` if set, else the argument.
#[derive(Debug, Clone)]
pub struct CrewdeskConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl CrewdeskConfig {
    /// Load from the current working directory.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile, &DefaultSecretResolver)
    }

    /// Load from `dir` with a custom secret resolver.
    pub fn load_from(
        dir: &Path,
        profile: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, ConfigError> {
        let active_profile = std::env::var(PROFILE_ENV).unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();
        loader::load_yaml_file(&dir.join(format!("{CONFIG_FILE_STEM}.yaml")), &mut values)?;
        loader::load_yaml_file(
            &dir.join(format!("{CONFIG_FILE_STEM}-{active_profile}.yaml")),
            &mut values,
        )?;

        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(format!(".env.{active_profile}")));

        for value in values.values_mut() {
            if let ConfigValue::String(s) = value {
                if s.contains("${") {
                    *s = secrets::resolve_placeholders(s, resolver)?;
                }
            }
        }

        for (env_key, env_val) in std::env::vars() {
            if env_key == PROFILE_ENV {
                continue;
            }
            if let Some(config_key) = loader::env_key_to_config_key(&env_key, ENV_PREFIX) {
                values.insert(config_key, ConfigValue::String(env_val));
            }
        }

        tracing::debug!(profile = %active_profile, keys = values.len(), "configuration loaded");
        Ok(Self {
            values,
            profile: active_profile,
        })
    }

    /// Create a config from a YAML string (useful for testing).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(Self {
            values,
            profile: profile.to_string(),
        })
    }

    /// Create an empty config (useful for testing).
    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    /// Set a value programmatically.
    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    /// Typed value for a dot-separated key.
    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Typed value, `None` when the key is absent. Type errors still surface.
    pub fn get_optional<V: FromConfigValue>(&self, key: &str) -> Result<Option<V>, ConfigError> {
        match self.values.get(key) {
            Some(value) => V::from_config_value(value, key).map(Some),
            None => Ok(None),
        }
    }

    /// Typed value, or `default` when missing or unconvertible.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The active profile name.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Build a typed section from this config.
    pub fn section<S: ConfigSection>(&self) -> Result<S, ConfigError> {
        S::from_config(self)
    }
}
