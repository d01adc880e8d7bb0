//! .RUL text generation

use chrono::{DateTime, Utc};

use crate::model::RuleSet;

const HEADER_TITLE: &str = "# Altium Designer Rules";
const HEADER_GENERATOR: &str = "# Generated by rulepivot";

/// Writes a rule set as .RUL text.
///
/// The output starts with a comment header, followed by one block per rule
/// in rule-set order separated by blank lines. Opaque rules are written
/// exactly as they were read.
#[derive(Debug, Clone, Default)]
pub struct RulWriter {
    generated_at: Option<DateTime<Utc>>,
}

impl RulWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `# Generated at ...` line to the header.
    pub fn with_timestamp(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    pub fn write(&self, rules: &RuleSet) -> String {
        let mut out = String::new();
        out.push_str(HEADER_TITLE);
        out.push_str("\n#\n");
        out.push_str(HEADER_GENERATOR);
        out.push('\n');
        if let Some(at) = self.generated_at {
            out.push_str(&format!("# Generated at {}\n", at.to_rfc3339()));
        }

        for rule in rules {
            out.push('\n');
            out.push_str(&rule.to_canonical_text());
            out.push('\n');
        }

        tracing::debug!("Serialized {} rules ({} bytes)", rules.len(), out.len());
        out
    }
}

/// Serialize a rule set with the default writer.
pub fn serialize_rul(rules: &RuleSet) -> String {
    RulWriter::new().write(rules)
}
