mod env;
mod loader;
mod types;
pub mod validation;

pub use env::{resolve_config_path, resolve_data_dir, CONFIG_FILE_NAME, CONFIG_PATH_ENV, DATA_DIR_ENV};
pub use loader::{load_app_config, load_config_from_file, load_config_from_str};
pub use types::*;
