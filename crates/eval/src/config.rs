//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::graph::EntryConvention;
use crate::page::DEFAULT_PAGE_SIZE;
use crate::report::TierTable;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("tier table is empty")]
    EmptyTierTable,
    #[error("tier '{name}' bound is not above the previous tier")]
    UnorderedTiers { name: String },
    #[error("final tier '{name}' must have no upper bound")]
    BoundedFinalTier { name: String },
    #[error("tier '{name}' has no upper bound but is not the final tier")]
    UnboundedInnerTier { name: String },
    #[error("page_size must be at least 1")]
    InvalidPageSize,
    #[error("config parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub page_size: usize,
    pub entry_convention: EntryConvention,
    pub tiers: TierTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: DEFAULT_PAGE_SIZE,
            entry_convention: EntryConvention::default(),
            tiers: TierTable::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        self.tiers.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size, 6);
        assert_eq!(config.entry_convention, EntryConvention::NoIncomingEdges);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_documents_fill_defaults() {
        let config: EngineConfig =
            serde_json::from_value(json!({ "entry_convention": "explicit_flag" })).unwrap();
        assert_eq!(config.entry_convention, EntryConvention::ExplicitFlag);
        assert_eq!(config.tiers, TierTable::default());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = EngineConfig {
            page_size: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPageSize));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_value::<EngineConfig>(json!({ "pagesize": 3 })).is_err());
    }
}
