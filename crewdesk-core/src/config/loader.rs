use std::collections::HashMap;
use std::path::Path;

use super::value::ConfigValue;
use super::ConfigError;

/// Load and parse a YAML file if it exists, flattening it into `values`.
pub(crate) fn load_yaml_file(
    path: &Path,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        load_yaml_str(&content, values)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    }
    Ok(())
}

pub(crate) fn load_yaml_str(
    content: &str,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten_yaml("", &yaml, values);
    Ok(())
}

/// Flatten a YAML tree into dot-separated keys (`query.stale_time_ms`).
pub(crate) fn flatten_yaml(
    prefix: &str,
    value: &serde_yaml::Value,
    out: &mut HashMap<String, ConfigValue>,
) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key_str = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => format!("{other:?}"),
                };
                let full_key = if prefix.is_empty() {
                    key_str
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(&full_key, v, out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), ConfigValue::from_yaml(leaf));
            }
        }
    }
}

/// Map an environment variable name to a config key, if it belongs to us.
///
/// `CREWDESK_QUERY__STALE_TIME_MS` -> `query.stale_time_ms`: the prefix is
/// stripped, the rest lowercased, and `__` separates nesting levels.
pub(crate) fn env_key_to_config_key(env_key: &str, prefix: &str) -> Option<String> {
    let rest = env_key.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_lowercase().replace("__", "."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_mapping() {
        assert_eq!(
            env_key_to_config_key("CREWDESK_QUERY__STALE_TIME_MS", "CREWDESK_").as_deref(),
            Some("query.stale_time_ms")
        );
        assert_eq!(
            env_key_to_config_key("CREWDESK_AUTH__LOGIN_PATH", "CREWDESK_").as_deref(),
            Some("auth.login_path")
        );
        assert_eq!(env_key_to_config_key("HOME", "CREWDESK_"), None);
        assert_eq!(env_key_to_config_key("CREWDESK_", "CREWDESK_"), None);
    }
}
