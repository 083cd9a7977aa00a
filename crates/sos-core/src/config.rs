use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::limits::{MAX_VALUE_DEPTH, PING_NONCE_LEN};
use crate::peer::{CURRENT_PEER_VERSION, PEER_VERSION_V1};

const MIN_VALUE_DEPTH: usize = 4;

/// Tunables for a [`crate::PeerEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerConfig {
    /// Version stamped on records whose gestalt does not declare one.
    pub default_version: i64,
    /// Deepest value nesting the default encoder accepts, counted from the
    /// record envelope.
    pub max_value_depth: usize,
    /// Random bytes stamped by a ping.
    pub ping_nonce_len: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            default_version: CURRENT_PEER_VERSION,
            max_value_depth: MAX_VALUE_DEPTH,
            ping_nonce_len: PING_NONCE_LEN,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse peer configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid peer configuration: {0}")]
    Invalid(String),
}

impl PeerConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_version < PEER_VERSION_V1 {
            return Err(ConfigError::Invalid(format!(
                "default_version must be at least {PEER_VERSION_V1}, got {}",
                self.default_version
            )));
        }
        // wire record -> description -> gestalt -> gestalt value
        if self.max_value_depth < MIN_VALUE_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "max_value_depth must be at least {MIN_VALUE_DEPTH}, got {}",
                self.max_value_depth
            )));
        }
        if self.ping_nonce_len == 0 {
            return Err(ConfigError::Invalid(
                "ping_nonce_len must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
