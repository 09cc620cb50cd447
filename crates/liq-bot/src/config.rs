//! Bot configuration.
//!
//! A merged record `{api, symbols, global}` loaded from TOML. Decimal
//! tunables are written as strings so they parse losslessly.

use crate::error::{AppError, AppResult};
use liq_core::{GlobalConfig, SymbolConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Default REST base for the venue.
fn default_rest_base() -> String {
    liq_rest::BASE_URL.to_string()
}

/// Default websocket base for the venue.
fn default_ws_base() -> String {
    "wss://fstream.asterdex.com".to_string()
}

/// API credentials section.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub api_key: String,
    pub secret_key: String,
}

/// Full merged configuration record.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub symbols: HashMap<String, SymbolConfig>,
    #[serde(default = "default_rest_base")]
    pub rest_base_url: String,
    #[serde(default = "default_ws_base")]
    pub ws_base_url: String,
}

impl BotConfig {
    /// Load configuration, preferring the explicit path, then the
    /// `LIQBOT_CONFIG` environment variable, then the default file.
    pub fn load(explicit: Option<&str>) -> AppResult<Self> {
        let path = explicit
            .map(str::to_string)
            .or_else(|| std::env::var("LIQBOT_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string());

        if !Path::new(&path).exists() {
            return Err(AppError::Config(format!("config file not found: {path}")));
        }
        Self::from_file(&path)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the merged record. Violations are fatal at startup.
    pub fn validate(&self) -> AppResult<()> {
        if self.api.api_key.is_empty() || self.api.secret_key.is_empty() {
            return Err(AppError::Config("api credentials must be set".to_string()));
        }
        self.global
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        for (symbol, config) in &self.symbols {
            config
                .validate(symbol)
                .map_err(|e| AppError::Config(e.to_string()))?;
        }
        if self.symbols.is_empty() {
            tracing::warn!("no symbols configured, the hunter will stay idle");
        }
        Ok(())
    }

    /// Symbols the market streams filter on.
    pub fn symbol_set(&self) -> std::collections::HashSet<String> {
        self.symbols.keys().cloned().collect()
    }
}
