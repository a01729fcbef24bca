//! Layered TOML configuration for the satchel binary.

mod discovery;
mod error;
mod types;

pub use discovery::{
    LoadedConfig, load_config_with_options, write_config_file, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::{SatchelConfig, StoreSection};
