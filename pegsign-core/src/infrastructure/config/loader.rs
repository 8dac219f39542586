//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Environment variables (`PEGSIGN_*` prefix)

use crate::foundation::{BridgeError, Result};
use crate::infrastructure::config::env::{resolve_config_path, resolve_data_dir, CONFIG_PATH_ENV, DATA_DIR_ENV};
use crate::infrastructure::config::types::AppConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::{debug, info};
use std::path::Path;

/// Environment variable prefix for config overrides.
///
/// Example: `PEGSIGN_SIGNER__PORT` -> `signer.port`
const ENV_PREFIX: &str = "PEGSIGN_";

fn env_provider() -> Env {
    let reserved = [CONFIG_PATH_ENV, DATA_DIR_ENV].map(|name| name.trim_start_matches(ENV_PREFIX).to_ascii_lowercase());
    let reserved: Vec<&str> = reserved.iter().map(String::as_str).collect();
    Env::prefixed(ENV_PREFIX).split("__").ignore(&reserved)
}

fn figment_base(path: &Path) -> Figment {
    let figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
    if path.exists() {
        figment.merge(Toml::file(path))
    } else {
        debug!("configuration file missing; using defaults and env only path={}", path.display());
        figment
    }
}

fn extract(figment: Figment) -> Result<AppConfig> {
    figment.extract().map_err(|err| BridgeError::ConfigError(format!("config extraction failed: {}", err)))
}

fn validated(config: AppConfig) -> Result<AppConfig> {
    config.validate().map_err(|errors| BridgeError::ConfigError(format!("validation failed: {:?}", errors)))?;
    Ok(config)
}

/// Loads configuration from a specific file path, then applies env overrides.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    info!("loading configuration path={}", path.display());
    let config = extract(figment_base(path).merge(env_provider()))?;
    debug!(
        "configuration loaded network={} signer={} keys={} bookkeeping_disabled={}",
        config.network,
        config.signer.addr(),
        config.keys.len(),
        config.bookkeeping.disabled
    );
    validated(config)
}

/// Loads configuration from TOML text without consulting the environment.
pub fn load_config_from_str(toml: &str) -> Result<AppConfig> {
    let figment = Figment::new().merge(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));
    validated(extract(figment)?)
}

/// Resolves the data dir and config path from the environment and loads from there.
pub fn load_app_config() -> Result<AppConfig> {
    let data_dir = resolve_data_dir()?;
    let config_path = resolve_config_path(&data_dir);
    load_config_from_file(&config_path)
}
