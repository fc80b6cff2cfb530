//! Engine configuration loaded from an optional TOML file.
//!
//! ```toml
//! page_size = 4
//! entry_convention = "explicit_flag"
//!
//! [[tiers]]
//! below = "10000"
//! name = "low"
//! label = "Tier 1"
//!
//! [[tiers]]
//! name = "high"
//! label = "Tier 2"
//! ```

use std::path::Path;

use pricewise_eval::{ConfigError, EngineConfig};

/// Read and validate the config at `path`; defaults when `None`.
pub(crate) fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let config = match path {
        None => EngineConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                ConfigError::Parse(format!("cannot read '{}': {}", path.display(), e))
            })?;
            parse_config(&text)?
        }
    };
    config.validate()?;
    Ok(config)
}

fn parse_config(text: &str) -> Result<EngineConfig, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
}
