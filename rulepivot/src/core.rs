//! Conversion entry points shared by the CLI and other front ends.
//! No file or terminal I/O happens here.

use serde::Serialize;

use crate::bridge::{pivot_to_rules, rules_to_pivot, BridgeWarning, MergeOptions};
use crate::config::{ConfigError, Preferences};
use crate::model::{RuleError, RuleKind, RuleSet};
use crate::pivot::{parse_pivot, render_pivot, Cell, PivotError, PivotTable, PivotWarning};
use crate::rul::{parse_rul, ParseOptions, RulWriter};
use crate::units::{ClearanceUnit, UnitDetection, UnitError};

#[derive(Debug, thiserror::Error)]
pub enum RulePivotError {
    #[error(transparent)]
    Pivot(#[from] PivotError),
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Options for a conversion run.
#[derive(Clone, Debug)]
pub struct ConversionOptions {
    pub parse: ParseOptions,
    /// Unit of rendered pivot tables.
    pub display_unit: ClearanceUnit,
    pub merge: MergeOptions,
    /// Stamp generated .RUL text with the current time.
    pub timestamp: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            display_unit: ClearanceUnit::Mil,
            merge: MergeOptions::default(),
            timestamp: false,
        }
    }
}

impl TryFrom<&Preferences> for ConversionOptions {
    type Error = RulePivotError;

    fn try_from(prefs: &Preferences) -> Result<Self, Self::Error> {
        Ok(Self {
            parse: ParseOptions {
                strict_names: prefs.strict_rule_names,
            },
            display_unit: prefs.default_unit.parse()?,
            merge: MergeOptions {
                rule_name_prefix: prefs.rule_name_prefix.clone(),
                policy: prefs.merge_policy,
                short_circuit_rules: prefs.short_circuit_rules,
                unrouted_net_rules: prefs.unrouted_net_rules,
            },
            timestamp: false,
        })
    }
}

/// Counts of a parsed rule set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleStats {
    pub rules: usize,
    pub clearance: usize,
    pub disabled: usize,
    pub opaque: usize,
    pub errors: usize,
}

impl RuleStats {
    fn collect(rules: &RuleSet, errors: &[RuleError]) -> Self {
        Self {
            rules: rules.len(),
            clearance: rules.of_kind(RuleKind::ElectricalClearance).count(),
            disabled: rules.iter().filter(|r| !r.enabled).count(),
            opaque: rules.iter().filter(|r| r.is_opaque()).count(),
            errors: errors.len(),
        }
    }
}

/// Result of checking a .RUL document.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub rules: RuleSet,
    pub errors: Vec<RuleError>,
    pub stats: RuleStats,
}

impl CheckResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Result of converting .RUL text into a pivot table.
#[derive(Debug, Clone, Serialize)]
pub struct PivotConversion {
    pub table: PivotTable,
    /// Square cell array in the display unit.
    pub cells: Vec<Vec<Cell>>,
    pub unit: ClearanceUnit,
    pub errors: Vec<RuleError>,
    pub warnings: Vec<BridgeWarning>,
    pub pivot_warnings: Vec<PivotWarning>,
    pub stats: RuleStats,
}

/// Result of converting a pivot table into .RUL text.
#[derive(Debug, Clone, Serialize)]
pub struct RulConversion {
    pub rules: RuleSet,
    pub text: String,
    pub detection: UnitDetection,
    /// Errors from parsing the existing rule file, if one was given.
    pub errors: Vec<RuleError>,
    pub warnings: Vec<BridgeWarning>,
    pub pivot_warnings: Vec<PivotWarning>,
    pub stats: RuleStats,
}

/// Core conversion API.
pub struct RulePivotCore;

impl RulePivotCore {
    /// Parse .RUL text and summarize it.
    pub fn check_rul(text: &str, options: &ConversionOptions) -> CheckResult {
        let parsed = parse_rul(text, &options.parse);
        let stats = RuleStats::collect(&parsed.rules, &parsed.errors);
        CheckResult {
            rules: parsed.rules,
            errors: parsed.errors,
            stats,
        }
    }

    /// Parse .RUL text and build its clearance pivot table.
    pub fn rul_to_pivot(text: &str, options: &ConversionOptions) -> PivotConversion {
        let parsed = parse_rul(text, &options.parse);
        let (table, warnings) = rules_to_pivot(&parsed.rules, options.display_unit);
        let rendered = render_pivot(&table, options.display_unit);
        let stats = RuleStats::collect(&parsed.rules, &parsed.errors);
        PivotConversion {
            table,
            cells: rendered.cells,
            unit: options.display_unit,
            errors: parsed.errors,
            warnings,
            pivot_warnings: rendered.warnings,
            stats,
        }
    }

    /// Parse a pivot cell array and produce .RUL text, merging into
    /// `existing` .RUL text when given.
    pub fn pivot_to_rul(
        cells: &[Vec<Cell>],
        existing: Option<&str>,
        unit_hint: Option<ClearanceUnit>,
        options: &ConversionOptions,
    ) -> Result<RulConversion, RulePivotError> {
        let pivot = parse_pivot(cells, unit_hint)?;
        let (base, errors) = match existing {
            Some(text) => {
                let parsed = parse_rul(text, &options.parse);
                (Some(parsed.rules), parsed.errors)
            }
            None => (None, Vec::new()),
        };

        let (rules, warnings) = pivot_to_rules(&pivot.table, base.as_ref(), &options.merge);
        let mut writer = RulWriter::new();
        if options.timestamp {
            writer = writer.with_timestamp(chrono::Utc::now());
        }
        let text = writer.write(&rules);
        let stats = RuleStats::collect(&rules, &errors);

        Ok(RulConversion {
            rules,
            text,
            detection: pivot.detection,
            errors,
            warnings,
            pivot_warnings: pivot.warnings,
            stats,
        })
    }

    /// Unit suggestion for a pivot cell array.
    pub fn detect_pivot_unit(cells: &[Vec<Cell>]) -> Result<UnitDetection, RulePivotError> {
        Ok(parse_pivot(cells, None)?.detection)
    }
}
