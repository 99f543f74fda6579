//! Error types for configuration loading.

use thiserror::Error;

/// Result type alias using the config error type.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
///
/// Any of these is fatal at startup: the runtime refuses to run with an
/// invalid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config document is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize the config document.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An environment override does not fit the key's type.
    #[error("environment override {var} is not valid for '{key}': {reason}")]
    BadOverride {
        var: String,
        key: String,
        reason: String,
    },

    /// A semantic constraint was violated.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A config key path does not exist.
    #[error("unknown config key '{0}'")]
    UnknownKey(String),
}
