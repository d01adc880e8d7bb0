//! Typed rule records
//!
//! A [`Rule`] carries the attributes every rule block shares (name, scopes,
//! enabled flag, priority, comment) and a [`RulePayload`] with the fields of
//! its kind. Blocks of kinds the engine does not model are kept as
//! [`RulePayload::Opaque`] with their text verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{RuleError, Scope};
use crate::units::ClearanceUnit;

/// Header keyword that opens a rule block.
pub const RULE_KEYWORD: &str = "Rule";

pub const KEY_NAME: &str = "Name";
pub const KEY_ENABLED: &str = "Enabled";
pub const KEY_COMMENT: &str = "Comment";
pub const KEY_PRIORITY: &str = "Priority";
pub const KEY_RULE_KIND: &str = "RuleKind";
pub const KEY_SCOPE: &str = "Scope";
pub const KEY_SOURCE_SCOPE: &str = "SourceScope";
pub const KEY_TARGET_SCOPE: &str = "TargetScope";
pub const KEY_MIN_CLEARANCE: &str = "MinimumClearance";
pub const KEY_MIN_CLEARANCE_TYPE: &str = "MinimumClearanceType";
pub const KEY_MIN_CREEPAGE: &str = "MinimumCreepage";
pub const KEY_MIN_CREEPAGE_TYPE: &str = "MinimumCreepageType";
pub const KEY_ALLOWED: &str = "Allowed";
pub const KEY_CHECK_BAD_CONNECTIONS: &str = "CheckBadConnections";
pub const KEY_ALLOW_MODIFIED: &str = "AllowModified";
pub const KEY_ALLOW_SHELVED: &str = "AllowShelved";

const INDENT: &str = "    ";

/// Rule kinds the engine models, plus the opaque fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    ElectricalClearance,
    ShortCircuit,
    UnRoutedNet,
    UnConnectedPin,
    ModifiedPolygon,
    CreepageDistance,
    Opaque,
}

impl RuleKind {
    pub const SUPPORTED: [RuleKind; 6] = [
        RuleKind::ElectricalClearance,
        RuleKind::ShortCircuit,
        RuleKind::UnRoutedNet,
        RuleKind::UnConnectedPin,
        RuleKind::ModifiedPolygon,
        RuleKind::CreepageDistance,
    ];

    /// Value of the `RuleKind` attribute. None for opaque rules.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            RuleKind::ElectricalClearance => Some("Clearance"),
            RuleKind::ShortCircuit => Some("ShortCircuit"),
            RuleKind::UnRoutedNet => Some("UnroutedNet"),
            RuleKind::UnConnectedPin => Some("UnconnectedPin"),
            RuleKind::ModifiedPolygon => Some("ModifiedPolygon"),
            RuleKind::CreepageDistance => Some("CreepageDistance"),
            RuleKind::Opaque => None,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|k| k.keyword() == Some(keyword))
    }

    /// Binary rules apply between two scopes; unary rules have one `Scope`.
    pub fn is_binary(&self) -> bool {
        matches!(self, RuleKind::ElectricalClearance | RuleKind::CreepageDistance)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RuleKind::ElectricalClearance => "Electrical Clearance",
            RuleKind::ShortCircuit => "Short-Circuit",
            RuleKind::UnRoutedNet => "Un-Routed Net",
            RuleKind::UnConnectedPin => "Un-Connected Pin",
            RuleKind::ModifiedPolygon => "Modified Polygon",
            RuleKind::CreepageDistance => "Creepage Distance",
            RuleKind::Opaque => "Unsupported",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A linear distance with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clearance {
    pub value: f64,
    pub unit: ClearanceUnit,
}

impl Clearance {
    pub fn new(value: f64, unit: ClearanceUnit) -> Self {
        Self { value, unit }
    }

    pub fn to_unit(&self, unit: ClearanceUnit) -> Clearance {
        Clearance::new(crate::units::convert(self.value, self.unit, unit), unit)
    }

    pub fn as_mil(&self) -> f64 {
        self.unit.to_mil(self.value)
    }

    /// Equal after unit normalization.
    pub fn same_distance(&self, other: &Clearance) -> bool {
        (self.as_mil() - other.as_mil()).abs() <= crate::units::CLEARANCE_EPSILON_MIL
    }

    fn validate(&self, rule: &str) -> Result<(), RuleError> {
        if !self.value.is_finite() {
            return Err(RuleError::malformed(rule, format!("clearance {} is not finite", self.value)));
        }
        if self.value < 0.0 {
            return Err(RuleError::malformed(rule, format!("clearance {} is negative", self.value)));
        }
        Ok(())
    }
}

impl fmt::Display for Clearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_number(self.value), self.unit)
    }
}

/// Shortest text that parses back to the same `f64`.
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Kind-specific constraint fields.
///
/// Optional flags are `None` when the block does not set them; they are
/// only written out when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulePayload {
    ElectricalClearance {
        min_clearance: Clearance,
    },
    ShortCircuit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allowed: Option<bool>,
    },
    UnRoutedNet {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        check_bad_connections: Option<bool>,
    },
    UnConnectedPin,
    ModifiedPolygon {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allow_modified: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        allow_shelved: Option<bool>,
    },
    CreepageDistance { min_creepage: Clearance },
    Opaque { keyword: String, raw_text: String },
}

impl RulePayload {
    pub fn kind(&self) -> RuleKind {
        match self {
            RulePayload::ElectricalClearance { .. } => RuleKind::ElectricalClearance,
            RulePayload::ShortCircuit { .. } => RuleKind::ShortCircuit,
            RulePayload::UnRoutedNet { .. } => RuleKind::UnRoutedNet,
            RulePayload::UnConnectedPin => RuleKind::UnConnectedPin,
            RulePayload::ModifiedPolygon { .. } => RuleKind::ModifiedPolygon,
            RulePayload::CreepageDistance { .. } => RuleKind::CreepageDistance,
            RulePayload::Opaque { .. } => RuleKind::Opaque,
        }
    }
}

/// One rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    name: String,
    pub scope_a: Scope,
    pub scope_b: Scope,
    pub enabled: bool,
    /// Lower value = higher precedence.
    pub priority: u32,
    pub comment: Option<String>,
    /// Attributes of a recognized block the engine does not model, in file
    /// order, with their raw right-hand side.
    pub extra_attributes: Vec<(String, String)>,
    /// Scope attributes the source block left out. An `All` side whose key
    /// was absent is not written back.
    #[serde(skip)]
    pub(crate) omitted_scope_keys: [bool; 2],
    payload: RulePayload,
}

impl Rule {
    fn build(
        name: impl Into<String>,
        scope_a: Scope,
        scope_b: Scope,
        payload: RulePayload,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RuleError::malformed("", "rule name is empty"));
        }
        let rule = Self {
            name,
            scope_a,
            scope_b,
            enabled: true,
            priority: 1,
            comment: None,
            extra_attributes: Vec::new(),
            omitted_scope_keys: [false; 2],
            payload,
        };
        rule.validate_scopes()?;
        rule.validate_payload()?;
        Ok(rule)
    }

    /// Class names must survive `InNetClass('…')` quoting and the `;` list
    /// separator.
    fn validate_scopes(&self) -> Result<(), RuleError> {
        for scope in [&self.scope_a, &self.scope_b] {
            for class in scope.classes() {
                if !Scope::is_valid_class_name(class) {
                    return Err(RuleError::malformed(
                        &self.name,
                        format!("net class name {:?} cannot be written as a scope", class),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_payload(&self) -> Result<(), RuleError> {
        match &self.payload {
            RulePayload::ElectricalClearance { min_clearance } => min_clearance.validate(&self.name),
            RulePayload::CreepageDistance { min_creepage } => min_creepage.validate(&self.name),
            _ => Ok(()),
        }
    }

    pub fn electrical_clearance(
        name: impl Into<String>,
        scope_a: Scope,
        scope_b: Scope,
        min_clearance: Clearance,
    ) -> Result<Self, RuleError> {
        Self::build(name, scope_a, scope_b, RulePayload::ElectricalClearance { min_clearance })
    }

    pub fn short_circuit(
        name: impl Into<String>,
        scope: Scope,
        allowed: Option<bool>,
    ) -> Result<Self, RuleError> {
        Self::build(name, scope, Scope::All, RulePayload::ShortCircuit { allowed })
    }

    pub fn unrouted_net(
        name: impl Into<String>,
        scope: Scope,
        check_bad_connections: Option<bool>,
    ) -> Result<Self, RuleError> {
        Self::build(
            name,
            scope,
            Scope::All,
            RulePayload::UnRoutedNet { check_bad_connections },
        )
    }

    pub fn unconnected_pin(name: impl Into<String>, scope: Scope) -> Result<Self, RuleError> {
        Self::build(name, scope, Scope::All, RulePayload::UnConnectedPin)
    }

    pub fn modified_polygon(
        name: impl Into<String>,
        scope: Scope,
        allow_modified: Option<bool>,
        allow_shelved: Option<bool>,
    ) -> Result<Self, RuleError> {
        Self::build(
            name,
            scope,
            Scope::All,
            RulePayload::ModifiedPolygon {
                allow_modified,
                allow_shelved,
            },
        )
    }

    pub fn creepage_distance(
        name: impl Into<String>,
        scope_a: Scope,
        scope_b: Scope,
        min_creepage: Clearance,
    ) -> Result<Self, RuleError> {
        Self::build(name, scope_a, scope_b, RulePayload::CreepageDistance { min_creepage })
    }

    /// Wrap a block the engine does not model. `raw_text` is re-emitted
    /// unchanged by the serializer.
    pub fn from_opaque(name: impl Into<String>, raw_text: impl Into<String>) -> Result<Self, RuleError> {
        Self::opaque_with_keyword(name, RULE_KEYWORD, raw_text)
    }

    pub(crate) fn opaque_with_keyword(
        name: impl Into<String>,
        keyword: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Result<Self, RuleError> {
        Self::build(
            name,
            Scope::All,
            Scope::All,
            RulePayload::Opaque {
                keyword: keyword.into(),
                raw_text: raw_text.into(),
            },
        )
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        let comment = comment.into();
        self.comment = if comment.is_empty() { None } else { Some(comment) };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RuleKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &RulePayload {
        &self.payload
    }

    pub fn scope(&self) -> (&Scope, &Scope) {
        (&self.scope_a, &self.scope_b)
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.payload, RulePayload::Opaque { .. })
    }

    pub fn min_clearance(&self) -> Option<Clearance> {
        match &self.payload {
            RulePayload::ElectricalClearance { min_clearance } => Some(*min_clearance),
            _ => None,
        }
    }

    /// Replace the minimum clearance of an Electrical Clearance rule.
    pub fn set_min_clearance(&mut self, clearance: Clearance) -> Result<(), RuleError> {
        clearance.validate(&self.name)?;
        match &mut self.payload {
            RulePayload::ElectricalClearance { min_clearance } => {
                *min_clearance = clearance;
                Ok(())
            }
            other => Err(RuleError::malformed(
                &self.name,
                format!("{} rule has no minimum clearance", other.kind()),
            )),
        }
    }

    /// Block text as written to a .RUL file, without a trailing newline.
    pub fn to_canonical_text(&self) -> String {
        if let RulePayload::Opaque { raw_text, .. } = &self.payload {
            return raw_text.clone();
        }

        let mut lines = vec![RULE_KEYWORD.to_string(), "{".to_string()];
        let mut attr = |key: &str, value: String| {
            lines.push(format!("{}{} = {}", INDENT, key, value));
        };

        attr(KEY_NAME, quoted(&self.name));
        attr(KEY_ENABLED, quoted_bool(self.enabled));
        if let Some(comment) = &self.comment {
            attr(KEY_COMMENT, quoted(comment));
        }
        attr(KEY_PRIORITY, self.priority.to_string());
        if let Some(keyword) = self.kind().keyword() {
            attr(KEY_RULE_KIND, quoted(keyword));
        }

        match &self.payload {
            RulePayload::ElectricalClearance { min_clearance } => {
                attr(KEY_MIN_CLEARANCE, format_number(min_clearance.value));
                attr(KEY_MIN_CLEARANCE_TYPE, quoted(min_clearance.unit.label()));
            }
            RulePayload::ShortCircuit { allowed } => {
                if let Some(allowed) = allowed {
                    attr(KEY_ALLOWED, quoted_bool(*allowed));
                }
            }
            RulePayload::UnRoutedNet { check_bad_connections } => {
                if let Some(check) = check_bad_connections {
                    attr(KEY_CHECK_BAD_CONNECTIONS, quoted_bool(*check));
                }
            }
            RulePayload::UnConnectedPin | RulePayload::Opaque { .. } => {}
            RulePayload::ModifiedPolygon {
                allow_modified,
                allow_shelved,
            } => {
                if let Some(allow) = allow_modified {
                    attr(KEY_ALLOW_MODIFIED, quoted_bool(*allow));
                }
                if let Some(allow) = allow_shelved {
                    attr(KEY_ALLOW_SHELVED, quoted_bool(*allow));
                }
            }
            RulePayload::CreepageDistance { min_creepage } => {
                attr(KEY_MIN_CREEPAGE, format_number(min_creepage.value));
                attr(KEY_MIN_CREEPAGE_TYPE, quoted(min_creepage.unit.label()));
            }
        }

        let scope_keys = if self.kind().is_binary() {
            vec![(KEY_SOURCE_SCOPE, &self.scope_a), (KEY_TARGET_SCOPE, &self.scope_b)]
        } else {
            vec![(KEY_SCOPE, &self.scope_a)]
        };
        for (i, (key, scope)) in scope_keys.into_iter().enumerate() {
            if !scope.is_all() || !self.omitted_scope_keys[i] {
                attr(key, scope.to_rul_format());
            }
        }

        for (key, raw) in &self.extra_attributes {
            attr(key, raw.clone());
        }

        lines.push("}".to_string());
        lines.join("\n")
    }
}

fn quoted(value: &str) -> String {
    format!("'{}'", value)
}

fn quoted_bool(value: bool) -> String {
    quoted(if value { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clearance_rule() -> Rule {
        Rule::electrical_clearance(
            "R1",
            Scope::net_class("ClassA"),
            Scope::net_class("ClassB"),
            Clearance::new(10.0, ClearanceUnit::Mil),
        )
        .unwrap()
    }

    #[test]
    fn test_constructor_rejects_empty_name() {
        let err = Rule::unconnected_pin("  ", Scope::All).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_constructor_rejects_bad_clearance() {
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let result = Rule::electrical_clearance(
                "Bad",
                Scope::All,
                Scope::All,
                Clearance::new(bad, ClearanceUnit::Mm),
            );
            assert!(matches!(result, Err(RuleError::Malformed { .. })), "{} accepted", bad);
        }
        assert!(Rule::creepage_distance(
            "Creep",
            Scope::All,
            Scope::All,
            Clearance::new(-0.5, ClearanceUnit::Mm)
        )
        .is_err());
    }

    #[test]
    fn test_kind_and_scope() {
        let rule = clearance_rule();
        assert_eq!(rule.kind(), RuleKind::ElectricalClearance);
        assert_eq!(
            rule.scope(),
            (&Scope::net_class("ClassA"), &Scope::net_class("ClassB"))
        );
        let unary = Rule::unrouted_net("U", Scope::net_class("PWR"), Some(false)).unwrap();
        assert_eq!(unary.scope_b, Scope::All);
        assert!(!unary.kind().is_binary());
        let shorts = Rule::short_circuit("S", Scope::net_class("PWR"), None).unwrap();
        assert_eq!(shorts.scope(), (&Scope::net_class("PWR"), &Scope::All));
        assert!(!shorts.kind().is_binary());
    }

    #[test]
    fn test_canonical_text_clearance() {
        let text = clearance_rule().with_comment("hv gap").to_canonical_text();
        let expected = "Rule\n{\n    Name = 'R1'\n    Enabled = 'true'\n    Comment = 'hv gap'\n    Priority = 1\n    RuleKind = 'Clearance'\n    MinimumClearance = 10\n    MinimumClearanceType = 'mil'\n    SourceScope = InNetClass('ClassA')\n    TargetScope = InNetClass('ClassB')\n}";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_canonical_text_unary_uses_scope_key() {
        let text = Rule::modified_polygon("Poly", Scope::All, Some(false), Some(true))
            .unwrap()
            .with_priority(4)
            .to_canonical_text();
        assert!(text.contains("    AllowModified = 'false'\n    AllowShelved = 'true'\n    Scope = All"));
        assert!(!text.contains("SourceScope"));
    }

    #[test]
    fn test_canonical_text_short_circuit_writes_single_scope() {
        let text = Rule::short_circuit("SC_PWR", Scope::net_class("PWR"), None)
            .unwrap()
            .to_canonical_text();
        let expected = "Rule\n{\n    Name = 'SC_PWR'\n    Enabled = 'true'\n    Priority = 1\n    RuleKind = 'ShortCircuit'\n    Scope = InNetClass('PWR')\n}";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_unset_flags_are_not_written() {
        let text = Rule::unrouted_net("U", Scope::All, None).unwrap().to_canonical_text();
        assert!(!text.contains("CheckBadConnections"));
        let text = Rule::modified_polygon("P", Scope::All, None, Some(false))
            .unwrap()
            .to_canonical_text();
        assert!(!text.contains("AllowModified"));
        assert!(text.contains("AllowShelved = 'false'"));
    }

    #[test]
    fn test_constructor_rejects_unquotable_class_names() {
        for bad in ["Bob's", "A;B", ""] {
            let result = Rule::electrical_clearance(
                "R",
                Scope::net_class(bad),
                Scope::All,
                Clearance::new(10.0, ClearanceUnit::Mil),
            );
            assert!(matches!(result, Err(RuleError::Malformed { .. })), "{:?} accepted", bad);
        }
        let listed = Scope::NetClasses(vec!["A".into(), "it's".into()]);
        assert!(Rule::unconnected_pin("P", listed).is_err());
        assert!(Rule::unconnected_pin("P", Scope::net_class("High Voltage")).is_ok());
    }

    #[test]
    fn test_opaque_text_is_verbatim() {
        let raw = "Rule\n{\n  Name='X'\n  RuleKind='Width'\n}";
        let rule = Rule::from_opaque("X", raw).unwrap();
        assert_eq!(rule.kind(), RuleKind::Opaque);
        assert_eq!(rule.to_canonical_text(), raw);
    }

    #[test]
    fn test_set_min_clearance() {
        let mut rule = clearance_rule();
        rule.set_min_clearance(Clearance::new(0.3, ClearanceUnit::Mm)).unwrap();
        assert_eq!(rule.min_clearance(), Some(Clearance::new(0.3, ClearanceUnit::Mm)));
        assert!(rule.set_min_clearance(Clearance::new(-2.0, ClearanceUnit::Mm)).is_err());

        let mut short = Rule::short_circuit("S", Scope::All, Some(false)).unwrap();
        assert!(short.set_min_clearance(Clearance::new(1.0, ClearanceUnit::Mil)).is_err());
    }

    #[test]
    fn test_same_distance_across_units() {
        let a = Clearance::new(10.0, ClearanceUnit::Mil);
        let b = Clearance::new(0.254, ClearanceUnit::Mm);
        assert!(a.same_distance(&b));
        assert!(!a.same_distance(&Clearance::new(0.25, ClearanceUnit::Mm)));
    }
}
