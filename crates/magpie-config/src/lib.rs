//! Configuration loading for the Magpie agent runtime.
//!
//! A single TOML document configures the whole system. Every key can be
//! overridden by an environment variable carrying the same dotted path:
//! `channels.bind` becomes `MAGPIE_CHANNELS__BIND`, `providers.openai.model`
//! becomes `MAGPIE_PROVIDERS__OPENAI__MODEL`, and so on. Overrides are typed:
//! a variable that does not parse as the key's TOML type is a fatal
//! configuration error.

pub mod error;
pub mod types;

pub use error::{ConfigError, Result};
pub use types::{
    AgentDefaults, AgentsConfig, ChannelsConfig, DatabaseConfig, LogConfig, MagpieConfig,
    MemorySettings, ProviderConfig, ProvidersConfig, RestChannelConfig, SchedulerConfig,
    ToolsConfig, WebSocketChannelConfig, WebhookChannelConfig,
};

use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "MAGPIE_";

/// Separator standing in for `.` inside variable names.
const ENV_SEP: &str = "__";

/// Default config file location: `~/.config/magpie/magpie.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("magpie").join("magpie.toml"))
}

/// Default data directory: `~/.local/share/magpie`.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("magpie"))
}

/// Load configuration from an optional explicit path.
///
/// Resolution: the explicit path if given (missing file is an error), else
/// the default location (missing file yields the default document). The
/// parsed document is merged over defaults, environment overrides are
/// applied, and the result is validated.
pub fn load(path: Option<&Path>) -> Result<MagpieConfig> {
    let raw = match path {
        Some(p) => Some(std::fs::read_to_string(p).map_err(|e| ConfigError::Io {
            path: p.display().to_string(),
            source: e,
        })?),
        None => match default_config_path() {
            Some(p) if p.exists() => {
                Some(std::fs::read_to_string(&p).map_err(|e| ConfigError::Io {
                    path: p.display().to_string(),
                    source: e,
                })?)
            }
            _ => None,
        },
    };

    load_from_str(raw.as_deref().unwrap_or(""))
}

/// Load configuration from a TOML string, applying env overrides and
/// validation.
pub fn load_from_str(raw: &str) -> Result<MagpieConfig> {
    // Merge the file document over the serialized defaults so every known
    // leaf exists for the override walk.
    let mut doc = toml::Value::try_from(MagpieConfig::default())
        .map_err(|e| ConfigError::Invalid(format!("default config not serializable: {}", e)))?;
    let file_doc: toml::Value = toml::from_str(raw)?;
    merge_value(&mut doc, file_doc);

    apply_env_overrides(&mut doc, &mut Vec::new())?;

    let config: MagpieConfig = doc
        .try_into()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Merge `overlay` into `base`; tables merge recursively, everything else
/// is replaced.
fn merge_value(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Walk the document tree and replace any leaf that has a matching
/// environment variable set.
fn apply_env_overrides(value: &mut toml::Value, path: &mut Vec<String>) -> Result<()> {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table.iter_mut() {
                path.push(key.clone());
                apply_env_overrides(child, path)?;
                path.pop();
            }
            Ok(())
        }
        leaf => {
            let var = env_var_name(path);
            if let Ok(raw) = std::env::var(&var) {
                let key = path.join(".");
                *leaf = parse_override(leaf, &raw).map_err(|reason| ConfigError::BadOverride {
                    var,
                    key,
                    reason,
                })?;
            }
            Ok(())
        }
    }
}

/// `["providers", "openai", "model"]` → `MAGPIE_PROVIDERS__OPENAI__MODEL`.
fn env_var_name(path: &[String]) -> String {
    let mut name = String::from(ENV_PREFIX);
    name.push_str(
        &path
            .iter()
            .map(|p| p.to_uppercase())
            .collect::<Vec<_>>()
            .join(ENV_SEP),
    );
    name
}

/// Parse an override string into the same TOML type as the existing leaf.
fn parse_override(
    existing: &toml::Value,
    raw: &str,
) -> std::result::Result<toml::Value, String> {
    match existing {
        toml::Value::Boolean(_) => raw
            .parse::<bool>()
            .map(toml::Value::Boolean)
            .map_err(|_| format!("expected a boolean, got '{}'", raw)),
        toml::Value::Integer(_) => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| format!("expected an integer, got '{}'", raw)),
        toml::Value::Float(_) => raw
            .parse::<f64>()
            .map(toml::Value::Float)
            .map_err(|_| format!("expected a float, got '{}'", raw)),
        toml::Value::String(_) => Ok(toml::Value::String(raw.to_string())),
        other => Err(format!(
            "cannot override {} values from the environment",
            other.type_str()
        )),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dotted-key access (CLI `config get` / `config set`)
// ─────────────────────────────────────────────────────────────────────────────

/// Read a value by dotted key from a config document.
pub fn get_key(config: &MagpieConfig, key: &str) -> Result<String> {
    let doc = toml::Value::try_from(config.clone())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut current = &doc;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
    }
    Ok(match current {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Set a value by dotted key in a config file, creating it if missing.
///
/// The value string is interpreted as bool, then integer, then float, then
/// falls back to a plain string.
pub fn set_key(path: &Path, key: &str, value: &str) -> Result<()> {
    let raw = if path.exists() {
        std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?
    } else {
        String::new()
    };

    let mut doc: toml::Value = toml::from_str(&raw)?;
    if !doc.is_table() {
        doc = toml::Value::Table(toml::map::Map::new());
    }

    let parsed = if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(value.to_string())
    };

    let parts: Vec<&str> = key.split('.').collect();
    let mut current = &mut doc;
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            let table = current
                .as_table_mut()
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            table.insert(part.to_string(), parsed.clone());
        } else {
            let next = current
                .as_table_mut()
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
            current = next;
        }
    }

    // Reject documents the typed config can no longer parse.
    let merged: MagpieConfig = {
        let mut base = toml::Value::try_from(MagpieConfig::default())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        merge_value(&mut base, doc.clone());
        base.try_into()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?
    };
    merged.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    std::fs::write(path, toml::to_string_pretty(&doc)?).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_empty_yields_defaults() {
        let config = load_from_str("").unwrap();
        assert_eq!(config.channels.bind, "127.0.0.1:8080");
        assert_eq!(config.memory.max_age_days, 30);
    }

    #[test]
    fn test_env_var_name() {
        let path = vec!["providers".to_string(), "openai".to_string(), "model".to_string()];
        assert_eq!(env_var_name(&path), "MAGPIE_PROVIDERS__OPENAI__MODEL");
    }

    #[test]
    fn test_env_override_applies() {
        // Unique key to avoid collisions with parallel tests.
        unsafe { std::env::set_var("MAGPIE_CHANNELS__BIND", "0.0.0.0:9999") };
        let config = load_from_str("").unwrap();
        unsafe { std::env::remove_var("MAGPIE_CHANNELS__BIND") };
        assert_eq!(config.channels.bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_env_override_type_mismatch() {
        unsafe { std::env::set_var("MAGPIE_TOOLS__EXEC_TIMEOUT_SECS", "not-a-number") };
        let err = load_from_str("").unwrap_err();
        unsafe { std::env::remove_var("MAGPIE_TOOLS__EXEC_TIMEOUT_SECS") };
        assert!(matches!(err, ConfigError::BadOverride { .. }));
    }

    #[test]
    fn test_get_key() {
        let config = MagpieConfig::default();
        assert_eq!(get_key(&config, "channels.bind").unwrap(), "127.0.0.1:8080");
        assert_eq!(
            get_key(&config, "memory.consolidation_threshold").unwrap(),
            "50"
        );
        assert!(matches!(
            get_key(&config, "no.such.key"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_key_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magpie.toml");

        set_key(&path, "channels.bind", "0.0.0.0:8081").unwrap();
        set_key(&path, "scheduler.enabled", "false").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let config = load_from_str(&raw).unwrap();
        assert_eq!(config.channels.bind, "0.0.0.0:8081");
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn test_set_key_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magpie.toml");
        // memory_window = 0 violates validation
        assert!(set_key(&path, "agents.defaults.memory_window", "0").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_file_merges_over_defaults() {
        let config = load_from_str("[agents.defaults]\nmax_tokens = 128\n").unwrap();
        assert_eq!(config.agents.defaults.max_tokens, 128);
        // Untouched siblings keep defaults
        assert_eq!(config.agents.defaults.max_iterations, 20);
    }
}
