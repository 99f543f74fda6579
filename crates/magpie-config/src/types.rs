//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [providers]              # default provider name + named provider tables
//! [channels]               # channel adapter settings
//! [agents.defaults]        # agent turn defaults
//! [tools]                  # tool execution settings
//! [memory]                 # consolidation settings
//! [database]               # SQLite path
//! [log]                    # log level and directory
//! [scheduler]              # cron scheduler
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections default so that a missing or partial config file still
/// yields a runnable document (validation catches the genuinely fatal
/// holes, like an enabled channel with no bind address).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MagpieConfig {
    pub providers: ProvidersConfig,
    pub channels: ChannelsConfig,
    pub agents: AgentsConfig,
    pub tools: ToolsConfig,
    pub memory: MemorySettings,
    /// Root directory for agent file operations.
    pub workspace: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub scheduler: SchedulerConfig,
}

impl MagpieConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve the provider config for the configured default.
    pub fn default_provider(&self) -> crate::Result<(&str, &ProviderConfig)> {
        let name = self.providers.default.as_deref().unwrap_or("openai");
        self.providers
            .entries
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| {
                crate::ConfigError::Invalid(format!("default provider '{}' is not configured", name))
            })
    }

    /// Check semantic constraints beyond what serde enforces.
    pub fn validate(&self) -> crate::Result<()> {
        if self.agents.defaults.max_iterations == 0 {
            return Err(crate::ConfigError::Invalid(
                "agents.defaults.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.agents.defaults.memory_window == 0 {
            return Err(crate::ConfigError::Invalid(
                "agents.defaults.memory_window must be at least 1".to_string(),
            ));
        }
        for (name, provider) in &self.providers.entries {
            if provider.base_url.is_empty() {
                return Err(crate::ConfigError::Invalid(format!(
                    "providers.{}.base_url must not be empty",
                    name
                )));
            }
        }
        if self.channels.webhook.enabled && self.channels.webhook.path.is_empty() {
            return Err(crate::ConfigError::Invalid(
                "channels.webhook.path must not be empty when the webhook is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

/// The `[providers]` section: a default name plus named provider tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Name of the provider used when none is requested.
    pub default: Option<String>,

    /// Named provider tables (`[providers.openai]`, `[providers.local]`, ...).
    #[serde(flatten)]
    pub entries: HashMap<String, ProviderConfig>,
}

/// Configuration for one OpenAI-compatible provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token; omit for local endpoints.
    pub api_key: Option<String>,
    /// Default model identifier.
    pub model: String,
    /// Extra headers sent with every request.
    pub extra_headers: HashMap<String, String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            extra_headers: HashMap::new(),
            timeout_secs: 120,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// The `[channels]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Address the HTTP server binds to.
    pub bind: String,
    pub websocket: WebSocketChannelConfig,
    pub webhook: WebhookChannelConfig,
    pub rest: RestChannelConfig,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            websocket: WebSocketChannelConfig::default(),
            webhook: WebhookChannelConfig::default(),
            rest: RestChannelConfig::default(),
        }
    }
}

/// WebSocket hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketChannelConfig {
    pub enabled: bool,
    /// Per-client send queue capacity.
    pub send_queue: usize,
}

impl Default for WebSocketChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            send_queue: 256,
        }
    }
}

/// Webhook endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookChannelConfig {
    pub enabled: bool,
    /// Mount path for the webhook POST endpoint.
    pub path: String,
    /// Shared secret for `X-Webhook-Signature` verification; unset disables
    /// signature checks.
    pub secret: Option<String>,
}

impl Default for WebhookChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/webhook".to_string(),
            secret: None,
        }
    }
}

/// REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestChannelConfig {
    pub enabled: bool,
}

impl Default for RestChannelConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents
// ─────────────────────────────────────────────────────────────────────────────

/// The `[agents]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

/// Turn defaults under `[agents.defaults]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub system_prompt: String,
    /// Model override; empty means the provider's configured model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard ceiling on provider calls per turn.
    pub max_iterations: u32,
    /// How many recent session messages enter the context window.
    pub memory_window: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            max_iterations: 20,
            memory_window: 20,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// The `[tools]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Timeout for blocking tool executions in seconds.
    pub exec_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// The `[memory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Messages per session before a consolidation pass runs.
    pub consolidation_threshold: usize,
    /// History memories older than this many days are pruned.
    pub max_age_days: i64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            consolidation_threshold: 50,
            max_age_days: 30,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database / Log / Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// The `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path. Relative paths resolve against the data directory.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("magpie.db"),
        }
    }
}

/// The `[log]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Console filter level: trace/debug/info/warn/error.
    pub level: String,
    /// Directory for rotating JSON log files.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

/// The `[scheduler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_runnable() {
        let config = MagpieConfig::from_toml("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.agents.defaults.max_iterations, 20);
        assert_eq!(config.memory.consolidation_threshold, 50);
        assert_eq!(config.channels.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_providers() {
        let toml = r#"
[providers]
default = "local"

[providers.local]
base_url = "http://localhost:11434/v1"
model = "qwen2.5"

[providers.openai]
base_url = "https://api.openai.com/v1"
api_key = "sk-test"
model = "gpt-4o"
timeout_secs = 60
"#;
        let config = MagpieConfig::from_toml(toml).unwrap();
        let (name, provider) = config.default_provider().unwrap();
        assert_eq!(name, "local");
        assert_eq!(provider.model, "qwen2.5");
        assert!(provider.api_key.is_none());

        let openai = &config.providers.entries["openai"];
        assert_eq!(openai.timeout_secs, 60);
        assert_eq!(openai.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_default_provider_missing() {
        let toml = r#"
[providers]
default = "missing"
"#;
        let config = MagpieConfig::from_toml(toml).unwrap();
        assert!(config.default_provider().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let toml = r#"
[agents.defaults]
max_iterations = 0
"#;
        let config = MagpieConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_webhook_requires_path() {
        let toml = r#"
[channels.webhook]
enabled = true
path = ""
"#;
        let config = MagpieConfig::from_toml(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip() {
        let mut config = MagpieConfig::default();
        config
            .providers
            .entries
            .insert("openai".to_string(), ProviderConfig::default());
        let toml = config.to_toml().unwrap();
        let restored = MagpieConfig::from_toml(&toml).unwrap();
        assert!(restored.providers.entries.contains_key("openai"));
    }
}
