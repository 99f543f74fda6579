//! CLI command handlers.

pub mod chat;
pub mod config;
pub mod cron;
pub mod run;
pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use magpie_agent::{
    CalculatorTool, MemoryUpdateTool, MessageTool, ToolRegistry,
};
use magpie_bus::MessageBus;
use magpie_config::MagpieConfig;
use magpie_memory::{Consolidator, ConsolidatorConfig};
use magpie_provider::{OpenAiConfig, OpenAiProvider, SharedProvider};
use magpie_server::{AppState, ServerSettings, StorageMemory};
use magpie_storage::{SqliteStorage, Storage};

/// Context shared by all commands.
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
}

impl Context {
    /// Load and validate the config document.
    pub fn load_config(&self) -> Result<MagpieConfig> {
        magpie_config::load(self.config_path.as_deref()).context("failed to load configuration")
    }

    /// The path `config set` writes to.
    pub fn config_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config_path {
            return Ok(path.clone());
        }
        magpie_config::default_config_path()
            .context("cannot determine the default config location")
    }
}

/// Resolve the database path against the data directory.
pub(crate) fn database_path(config: &MagpieConfig) -> PathBuf {
    let path = &config.database.path;
    if path.is_absolute() {
        return path.clone();
    }
    match magpie_config::data_dir() {
        Some(dir) => dir.join(path),
        None => path.clone(),
    }
}

/// Build the provider backend from the config document.
pub fn build_provider(config: &MagpieConfig) -> Result<SharedProvider> {
    let (name, provider) = config.default_provider()?;

    let mut backend = OpenAiConfig::new(name, &provider.base_url, &provider.model)
        .with_timeout(std::time::Duration::from_secs(provider.timeout_secs));
    if let Some(api_key) = &provider.api_key {
        backend = backend.with_api_key(api_key);
    }
    for (header, value) in &provider.extra_headers {
        backend = backend.with_header(header, value);
    }

    Ok(Arc::new(OpenAiProvider::new(backend)?))
}

/// Wire the full application state: storage, bus, provider, tools.
pub fn build_state(config: &MagpieConfig, provider: SharedProvider) -> Result<AppState> {
    let db_path = database_path(config);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?,
    );

    Ok(build_state_with(config, provider, storage))
}

/// Wire state over an explicit storage backend (the REPL uses in-memory).
pub fn build_state_with(
    config: &MagpieConfig,
    provider: SharedProvider,
    storage: Arc<dyn Storage>,
) -> AppState {
    let bus = Arc::new(MessageBus::new());

    let tools = ToolRegistry::new();
    tools.register(CalculatorTool);
    tools.register(MessageTool::new(bus.clone()));
    tools.register(MemoryUpdateTool::new(Arc::new(StorageMemory::new(
        storage.clone(),
    ))));

    let consolidator = Consolidator::new(ConsolidatorConfig {
        threshold: config.memory.consolidation_threshold,
        max_age_days: config.memory.max_age_days,
    });

    let defaults = &config.agents.defaults;
    let settings = ServerSettings {
        system_prompt: defaults.system_prompt.clone(),
        model: defaults.model.clone().unwrap_or_default(),
        temperature: Some(defaults.temperature),
        max_tokens: defaults.max_tokens,
        max_iterations: defaults.max_iterations,
        memory_window: defaults.memory_window,
        webhook_secret: config.channels.webhook.secret.clone(),
        ws_send_queue: config.channels.websocket.send_queue,
        exec_timeout: std::time::Duration::from_secs(config.tools.exec_timeout_secs),
        ..Default::default()
    };

    AppState::new(bus, storage, provider, Arc::new(tools), Arc::new(consolidator), settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_state_registers_builtin_tools() {
        let config = magpie_config::load_from_str("").unwrap();
        let provider: SharedProvider = Arc::new(magpie_provider::MockProvider::with_text("hi"));
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());

        let state = build_state_with(&config, provider, storage);

        let mut names = state.tools.names();
        names.sort();
        assert_eq!(names, vec!["calculator", "memory_update", "message"]);
        assert_eq!(state.settings.max_iterations, 20);
    }

    #[test]
    fn test_build_provider_requires_configured_default() {
        let config = magpie_config::load_from_str("").unwrap();
        // No [providers.openai] table exists, so the default cannot resolve.
        assert!(build_provider(&config).is_err());

        let config = magpie_config::load_from_str(
            "[providers.openai]\nbase_url = \"http://localhost:8000/v1\"\nmodel = \"m\"\n",
        )
        .unwrap();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "m");
    }
}
