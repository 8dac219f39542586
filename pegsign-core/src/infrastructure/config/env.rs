use crate::foundation::{BridgeError, Result};
use std::path::{Path, PathBuf};

pub const CONFIG_PATH_ENV: &str = "PEGSIGN_CONFIG_PATH";
pub const DATA_DIR_ENV: &str = "PEGSIGN_DATA_DIR";

pub const CONFIG_FILE_NAME: &str = "pegsign.toml";
const DEFAULT_DATA_DIR_NAME: &str = ".pegsign";

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub fn resolve_data_dir() -> Result<PathBuf> {
    if let Some(dir) = non_empty_env(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let cwd = std::env::current_dir()
        .map_err(|err| BridgeError::StorageError { operation: "env::current_dir".to_string(), details: err.to_string() })?;
    Ok(cwd.join(DEFAULT_DATA_DIR_NAME))
}

pub fn resolve_config_path(data_dir: &Path) -> PathBuf {
    non_empty_env(CONFIG_PATH_ENV).map(PathBuf::from).unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME))
}
