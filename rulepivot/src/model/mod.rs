//! In-memory rule model: scopes, typed rules and ordered rule sets.

pub mod rule;
pub mod rule_set;
pub mod scope;

pub use rule::{format_number, Clearance, Rule, RuleKind, RulePayload};
pub use rule_set::RuleSet;
pub use scope::Scope;

use serde::Serialize;
use thiserror::Error;

/// Per-record rule failures. These are collected alongside a best-effort
/// result rather than aborting the operation.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleError {
    #[error("Malformed rule '{rule}': {reason}")]
    Malformed { rule: String, reason: String },
    #[error("Malformed rule '{rule}': missing required attribute {attribute}")]
    MissingAttribute { rule: String, attribute: String },
    #[error("Duplicate rule name '{name}'")]
    DuplicateName { name: String },
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl RuleError {
    pub fn malformed(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        RuleError::Malformed {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// True for the malformed-rule family (bad value or missing attribute).
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            RuleError::Malformed { .. } | RuleError::MissingAttribute { .. }
        )
    }

    /// Name of the rule the error refers to, when known.
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            RuleError::Malformed { rule, .. } | RuleError::MissingAttribute { rule, .. } => {
                Some(rule)
            }
            RuleError::DuplicateName { name } => Some(name),
            RuleError::Syntax { .. } => None,
        }
    }
}
