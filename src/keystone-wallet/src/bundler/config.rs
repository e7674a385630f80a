use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Bundler policy. Every field has a default, so `{}` is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BundlerConfig {
    /// Entry points accepted by `submit_operation`. Empty means "the one we were built with".
    pub entry_points: Vec<Address>,
    /// Operations whose window closes within this many seconds are refused.
    pub validity_margin_secs: u64,
    pub max_ops_per_sender: usize,
    /// Refuse operations whose validation breaks the access rules.
    pub enforce_validation_rules: bool,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            entry_points: Vec::new(),
            validity_margin_secs: 30,
            max_ops_per_sender: 4,
            enforce_validation_rules: true,
        }
    }
}

impl BundlerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
