pub mod check;
pub mod config_cmd;
pub mod run;

use std::path::Path;

use stepwire_config::{ConfigError, EngineConfig};

/// Load from `path` when given, else from the default location.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
}
