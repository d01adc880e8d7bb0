//! User preferences file
//!
//! A small JSON document; every field is optional and falls back to its
//! default:
//!
//! ```json
//! {
//!   "default_unit": "mm",
//!   "rule_name_prefix": "Clearance_",
//!   "strict_rule_names": false,
//!   "merge_policy": "pivot_wins",
//!   "short_circuit_rules": false,
//!   "unrouted_net_rules": false
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::MergePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read preferences {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid preferences {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn default_unit() -> String {
    "mil".to_string()
}

fn default_prefix() -> String {
    "Clearance_".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Display unit label. Any spelling [`crate::units::ClearanceUnit::from_label`]
    /// accepts.
    #[serde(default = "default_unit")]
    pub default_unit: String,
    /// Prefix for rule names generated from pivot cells
    #[serde(default = "default_prefix")]
    pub rule_name_prefix: String,
    /// Reject duplicate rule names instead of letting the later one win
    #[serde(default)]
    pub strict_rule_names: bool,
    #[serde(default)]
    pub merge_policy: MergePolicy,
    /// Generate a Short-Circuit rule per net class when writing rules
    #[serde(default)]
    pub short_circuit_rules: bool,
    /// Generate an Un-Routed Net rule per net class when writing rules
    #[serde(default)]
    pub unrouted_net_rules: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_unit: default_unit(),
            rule_name_prefix: default_prefix(),
            strict_rule_names: false,
            merge_policy: MergePolicy::default(),
            short_circuit_rules: false,
            unrouted_net_rules: false,
        }
    }
}

impl Preferences {
    /// Load preferences from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No preferences at {}, using defaults", shown);
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path: shown, source }),
        };
        let prefs = serde_json::from_str(&content)
            .map_err(|source| ConfigError::Json { path: shown.clone(), source })?;
        tracing::info!("Loaded preferences from {}", shown);
        Ok(prefs)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let shown = path.display().to_string();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: shown.clone(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io { path: shown, source })
    }
}
