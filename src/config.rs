//! Engine configuration: defaults, TOML file loading, environment variable
//! overrides, and validation.

use crate::games::payout::TierTable;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Game policy knobs. The tier table, the house edge band, and the crash
/// growth rate are policy, not law; anything passing validation is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// House edge at minimum mine density.
    pub edge_min: f64,
    /// House edge at maximum mine density.
    pub edge_max: f64,
    /// Crash multiplier growth per second.
    pub growth_rate: f64,
    /// Delay between crash round creation and RUNNING.
    pub pre_roll_ms: u64,
    /// Number of draws in a slide sequence.
    pub slide_sequence_len: usize,
    pub max_wager: f64,
    pub tiers: TierTable,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            edge_min: 0.01,
            edge_max: 0.05,
            growth_rate: 0.1,
            pre_roll_ms: 3_000,
            slide_sequence_len: 10,
            max_wager: 1_000.0,
            tiers: TierTable::default_policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./fairbet_data".to_string(),
        }
    }
}

/// Configuration loader with file and environment variable support.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn load(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<EngineConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to read {path}: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to parse TOML: {e}")))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        if let Ok(addr) = env::var("FAIRBET_LISTEN_ADDRESS") {
            config.api.listen_address = addr;
        }
        if let Ok(port) = env::var("FAIRBET_API_PORT") {
            config.api.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                field: "FAIRBET_API_PORT".to_string(),
                value: port,
                reason: "invalid port number".to_string(),
            })?;
        }
        if let Ok(data_dir) = env::var("FAIRBET_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        if let Ok(pre_roll) = env::var("FAIRBET_PRE_ROLL_MS") {
            config.game.pre_roll_ms = pre_roll.parse().map_err(|_| ConfigError::InvalidValue {
                field: "FAIRBET_PRE_ROLL_MS".to_string(),
                value: pre_roll,
                reason: "invalid millisecond value".to_string(),
            })?;
        }
        Ok(())
    }

    fn validate(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        let game = &config.game;

        if !(0.0..1.0).contains(&game.edge_min) || !(0.0..1.0).contains(&game.edge_max) {
            return Err(ConfigError::InvalidValue {
                field: "game.edge_min/edge_max".to_string(),
                value: format!("{}/{}", game.edge_min, game.edge_max),
                reason: "house edge must lie in [0, 1)".to_string(),
            });
        }
        if game.edge_min > game.edge_max {
            return Err(ConfigError::InvalidValue {
                field: "game.edge_min".to_string(),
                value: game.edge_min.to_string(),
                reason: "edge_min must not exceed edge_max".to_string(),
            });
        }
        if !(game.growth_rate.is_finite() && game.growth_rate > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "game.growth_rate".to_string(),
                value: game.growth_rate.to_string(),
                reason: "growth rate must be positive and finite".to_string(),
            });
        }
        if game.slide_sequence_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "game.slide_sequence_len".to_string(),
                value: "0".to_string(),
                reason: "sequence length cannot be zero".to_string(),
            });
        }
        if !(game.max_wager.is_finite() && game.max_wager > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "game.max_wager".to_string(),
                value: game.max_wager.to_string(),
                reason: "max wager must be positive and finite".to_string(),
            });
        }
        game.tiers.validate().map_err(|e| ConfigError::InvalidValue {
            field: "game.tiers".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;

        if config.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "api.port".to_string(),
                value: "0".to_string(),
                reason: "port cannot be zero".to_string(),
            });
        }
        if config.storage.data_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".to_string(),
                value: String::new(),
                reason: "data directory cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
