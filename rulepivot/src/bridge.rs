//! Conversion between rule sets and pivot tables
//!
//! Only electrical clearance rules take part. Every other rule passes
//! through [`pivot_to_rules`] untouched.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Clearance, Rule, RuleError, RuleKind, RuleSet, Scope};
use crate::pivot::{NetClassRegistry, PivotTable};
use crate::units::ClearanceUnit;

/// Non-fatal findings of a bridge conversion.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeWarning {
    #[error("Rule '{rule}' is disabled and was skipped")]
    DisabledRule { rule: String },
    #[error("Rule '{rule}' has a scope that cannot be placed in a pivot table: {reason}")]
    UnresolvableScope { rule: String, reason: String },
    #[error("Rule '{rule}' is fully shadowed by higher-precedence rules")]
    Shadowed { rule: String },
    #[error("Rule '{rule}' ({class_a} / {class_b}) has no cell in the pivot table and was kept")]
    Orphaned {
        rule: String,
        class_a: String,
        class_b: String,
    },
    #[error("Pivot pair {class_a} / {class_b} is inconsistent and was skipped")]
    Inconsistent { class_a: String, class_b: String },
    #[error("Rule '{rule}' has clearance {rule_value} but the pivot table has {pivot_value}; kept {kept:?}")]
    ClearanceMismatch {
        rule: String,
        rule_value: Clearance,
        pivot_value: Clearance,
        kept: MergePolicy,
    },
    #[error("Rule '{rule}' sets {class_a} / {class_b} together with other pairs; kept {rule_value} instead of {pivot_value}")]
    SharedScope {
        rule: String,
        class_a: String,
        class_b: String,
        rule_value: Clearance,
        pivot_value: Clearance,
    },
    #[error("Could not create rule '{rule}': {reason}")]
    Rejected { rule: String, reason: String },
}

/// Which value survives when an existing rule and the pivot table disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    PivotWins,
    RuleWins,
}

/// Settings for [`pivot_to_rules`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Prefix for generated rule names.
    pub rule_name_prefix: String,
    pub policy: MergePolicy,
    /// Add a `ShortCircuit_<class>` rule for every class on the table axis.
    pub short_circuit_rules: bool,
    /// Add an `UnroutedNet_<class>` rule for every class on the table axis.
    pub unrouted_net_rules: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            rule_name_prefix: "Clearance_".to_string(),
            policy: MergePolicy::default(),
            short_circuit_rules: false,
            unrouted_net_rules: false,
        }
    }
}

/// State for a single conversion. Build one per call and drop it after.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    pub display_unit: ClearanceUnit,
    pub registry: NetClassRegistry,
}

impl ConversionContext {
    pub fn new(display_unit: ClearanceUnit) -> Self {
        Self {
            display_unit,
            registry: NetClassRegistry::new(),
        }
    }

    /// Register classes that should appear in the table even when no rule
    /// names them.
    pub fn with_classes<'a>(mut self, classes: impl IntoIterator<Item = &'a str>) -> Self {
        for class in classes {
            self.registry.register(class);
        }
        self
    }
}

/// Build a pivot table from the clearance rules of a rule set.
pub fn rules_to_pivot(
    rules: &RuleSet,
    target_unit: ClearanceUnit,
) -> (PivotTable, Vec<BridgeWarning>) {
    rules_to_pivot_with(rules, &mut ConversionContext::new(target_unit))
}

/// [`rules_to_pivot`] with a caller-supplied context.
///
/// Explicitly scoped rules claim their pairs first, in precedence order,
/// and the first rule to claim a pair wins. Rules with an `All` side then
/// fill the pairs nobody claimed.
pub fn rules_to_pivot_with(
    rules: &RuleSet,
    ctx: &mut ConversionContext,
) -> (PivotTable, Vec<BridgeWarning>) {
    register_rule_classes(rules, &mut ctx.registry);

    let mut table = PivotTable::with_classes(ctx.registry.names());
    let mut warnings = Vec::new();
    for claim in claim_pairs(rules, &ctx.registry, &mut warnings) {
        let Some(clearance) = claim.rule.min_clearance() else {
            continue;
        };
        let clearance = clearance.to_unit(ctx.display_unit);
        for (i, j) in claim.pairs {
            if let (Some(row), Some(col)) = (ctx.registry.name_at(i), ctx.registry.name_at(j)) {
                table.set(row, col, clearance);
            }
        }
    }

    tracing::info!(
        "Built pivot table: {} classes, {} pairs, {} warnings",
        ctx.registry.len(),
        table.len(),
        warnings.len()
    );
    (table, warnings)
}

fn register_rule_classes(rules: &RuleSet, registry: &mut NetClassRegistry) {
    for rule in rules {
        let (a, b) = rule.scope();
        for class in a.classes().into_iter().chain(b.classes()) {
            registry.register(class);
        }
    }
}

/// The table pairs one clearance rule supplies.
struct Claim<'a> {
    rule: &'a Rule,
    /// No `All` side.
    explicit: bool,
    pairs: Vec<(usize, usize)>,
}

/// Decide which enabled clearance rule supplies each class pair.
///
/// Skipped rules are reported into `warnings`. Every rule that resolves to
/// at least one pair gets a claim, possibly with no pairs left when earlier
/// rules took them all.
fn claim_pairs<'a>(
    rules: &'a RuleSet,
    registry: &NetClassRegistry,
    warnings: &mut Vec<BridgeWarning>,
) -> Vec<Claim<'a>> {
    let mut explicit = Vec::new();
    let mut wildcard = Vec::new();

    for rule in rules.by_precedence() {
        if rule.kind() != RuleKind::ElectricalClearance {
            continue;
        }
        if !rule.enabled {
            tracing::debug!("Skipping disabled rule '{}'", rule.name());
            warnings.push(BridgeWarning::DisabledRule {
                rule: rule.name().to_string(),
            });
            continue;
        }
        let (a, b) = rule.scope();
        if let Some(raw) = [a, b].into_iter().find_map(|scope| match scope {
            Scope::Query(raw) => Some(raw),
            _ => None,
        }) {
            tracing::warn!("Rule '{}' uses query scope {}", rule.name(), raw);
            warnings.push(BridgeWarning::UnresolvableScope {
                rule: rule.name().to_string(),
                reason: format!("query scope {}", raw),
            });
            continue;
        }
        if a.is_all() || b.is_all() {
            wildcard.push(rule);
        } else {
            explicit.push(rule);
        }
    }

    let mut covered = BTreeSet::new();
    let mut claims = Vec::new();
    for (rule, is_explicit) in explicit
        .into_iter()
        .map(|r| (r, true))
        .chain(wildcard.into_iter().map(|r| (r, false)))
    {
        let candidates = resolve_pairs(rule, registry);
        if candidates.is_empty() {
            warnings.push(BridgeWarning::UnresolvableScope {
                rule: rule.name().to_string(),
                reason: "scope resolves to no distinct class pair".to_string(),
            });
            continue;
        }
        let pairs: Vec<(usize, usize)> = candidates
            .into_iter()
            .filter(|pair| covered.insert(*pair))
            .collect();
        if pairs.is_empty() && is_explicit {
            warnings.push(BridgeWarning::Shadowed {
                rule: rule.name().to_string(),
            });
        }
        claims.push(Claim {
            rule,
            explicit: is_explicit,
            pairs,
        });
    }
    claims
}

/// Unordered distinct class pairs `(low index, high index)` a rule covers.
fn resolve_pairs(rule: &Rule, registry: &NetClassRegistry) -> BTreeSet<(usize, usize)> {
    let side = |scope: &Scope| -> Vec<usize> {
        if scope.is_all() {
            (0..registry.len()).collect()
        } else {
            scope
                .classes()
                .into_iter()
                .filter_map(|class| registry.index_of(class))
                .collect()
        }
    };
    let (a, b) = rule.scope();
    let (a, b) = (side(a), side(b));
    let mut pairs = BTreeSet::new();
    for &i in &a {
        for &j in &b {
            if i != j {
                pairs.insert((i.min(j), i.max(j)));
            }
        }
    }
    pairs
}

fn pair_index(registry: &NetClassRegistry, a: &str, b: &str) -> Option<(usize, usize)> {
    let (i, j) = (registry.index_of(a)?, registry.index_of(b)?);
    Some((i.min(j), i.max(j)))
}

/// A clearance rule scoped to one class on each side.
fn is_pair_rule(rule: &Rule) -> bool {
    let (a, b) = rule.scope();
    a.single_class().is_some() && b.single_class().is_some()
}

fn scope_label(scope: &Scope) -> String {
    match scope {
        Scope::NetClass(_) | Scope::NetClasses(_) => scope.classes().join(";"),
        other => other.to_rul_format(),
    }
}

/// Turn a class name into a rule-name fragment.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn unique_name(rules: &RuleSet, base: String) -> String {
    if !rules.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !rules.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Append a generated rule at the lowest precedence.
fn append_rule(
    rules: &mut RuleSet,
    warnings: &mut Vec<BridgeWarning>,
    name: String,
    build: impl FnOnce(String) -> Result<Rule, RuleError>,
) -> bool {
    let name = unique_name(rules, name);
    let priority = rules.next_priority();
    match build(name.clone()).and_then(|rule| rules.push(rule.with_priority(priority))) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("Could not create rule '{}': {}", name, err);
            warnings.push(BridgeWarning::Rejected {
                rule: name,
                reason: err.to_string(),
            });
            false
        }
    }
}

/// Produce a rule set carrying the pivot table's clearances.
///
/// The existing rules are laid over the table the way [`rules_to_pivot`]
/// would lay them out. A pair supplied by a single-pair rule updates that
/// rule. A pair supplied by a multi-class rule is left to that rule and
/// reported when the values differ. Pairs supplied only by an `All` rule
/// with a different value, and pairs nothing supplies, get a new rule
/// appended after the existing ones. Rules whose pairs have no cell are
/// reported but never removed.
pub fn pivot_to_rules(
    table: &PivotTable,
    existing: Option<&RuleSet>,
    options: &MergeOptions,
) -> (RuleSet, Vec<BridgeWarning>) {
    let empty = RuleSet::new();
    let source = existing.unwrap_or(&empty);
    let mut rules = source.clone();
    let mut warnings = Vec::new();

    let mut registry = table.registry().clone();
    register_rule_classes(source, &mut registry);
    let claims = claim_pairs(source, &registry, &mut Vec::new());
    let mut owner: HashMap<(usize, usize), usize> = HashMap::new();
    for (index, claim) in claims.iter().enumerate() {
        for &pair in &claim.pairs {
            owner.insert(pair, index);
        }
    }
    let mut used = vec![false; claims.len()];

    let mut updated = 0;
    let mut created = 0;
    for pair in table.pairs() {
        let claimed = pair_index(&registry, &pair.class_a, &pair.class_b)
            .and_then(|key| owner.get(&key).copied());
        if let Some(index) = claimed {
            used[index] = true;
            let claim = &claims[index];
            let Some(current) = claim.rule.min_clearance() else {
                continue;
            };
            let pivot_value = pair.clearance.to_unit(current.unit);
            if current.same_distance(&pivot_value) {
                continue;
            }

            if is_pair_rule(claim.rule) {
                tracing::warn!(
                    "Rule '{}' clearance {} differs from pivot value {}",
                    claim.rule.name(),
                    current,
                    pivot_value
                );
                warnings.push(BridgeWarning::ClearanceMismatch {
                    rule: claim.rule.name().to_string(),
                    rule_value: current,
                    pivot_value,
                    kept: options.policy,
                });
                if options.policy == MergePolicy::PivotWins {
                    let target = rules
                        .position(claim.rule.name())
                        .and_then(|position| rules.get_mut_at(position));
                    if let Some(rule) = target {
                        match rule.set_min_clearance(pivot_value) {
                            Ok(()) => updated += 1,
                            Err(err) => warnings.push(BridgeWarning::Rejected {
                                rule: rule.name().to_string(),
                                reason: err.to_string(),
                            }),
                        }
                    }
                }
                continue;
            }

            if claim.explicit {
                tracing::warn!(
                    "Rule '{}' sets {} / {} with other pairs; keeping {}",
                    claim.rule.name(),
                    pair.class_a,
                    pair.class_b,
                    current
                );
                warnings.push(BridgeWarning::SharedScope {
                    rule: claim.rule.name().to_string(),
                    class_a: pair.class_a.clone(),
                    class_b: pair.class_b.clone(),
                    rule_value: current,
                    pivot_value,
                });
                continue;
            }
        }

        let base = format!(
            "{}{}_to_{}",
            options.rule_name_prefix,
            sanitize(&pair.class_a),
            sanitize(&pair.class_b)
        );
        let comment = format!(
            "Clearance between NetClass '{}' and NetClass '{}'",
            pair.class_a, pair.class_b
        );
        let built = append_rule(&mut rules, &mut warnings, base, |name| {
            Ok(Rule::electrical_clearance(
                name,
                Scope::net_class(pair.class_a.clone()),
                Scope::net_class(pair.class_b.clone()),
                pair.clearance,
            )?
            .with_comment(comment))
        });
        if built {
            created += 1;
        }
    }

    for (class_a, class_b) in table.inconsistent_pairs() {
        if let Some(&index) = pair_index(&registry, &class_a, &class_b).and_then(|key| owner.get(&key)) {
            used[index] = true;
        }
        warnings.push(BridgeWarning::Inconsistent { class_a, class_b });
    }

    for (claim, &is_used) in claims.iter().zip(&used) {
        if claim.explicit && !claim.pairs.is_empty() && !is_used {
            let (a, b) = claim.rule.scope();
            warnings.push(BridgeWarning::Orphaned {
                rule: claim.rule.name().to_string(),
                class_a: scope_label(a),
                class_b: scope_label(b),
            });
        }
    }

    created += append_class_rules(table, &mut rules, &mut warnings, options);

    tracing::info!(
        "Merged pivot into {} rules: {} created, {} updated, {} warnings",
        rules.len(),
        created,
        updated,
        warnings.len()
    );
    (rules, warnings)
}

/// Per-class Short-Circuit and Un-Routed Net rules for the table axis.
/// A class that already has a rule of the kind scoped to it is skipped.
fn append_class_rules(
    table: &PivotTable,
    rules: &mut RuleSet,
    warnings: &mut Vec<BridgeWarning>,
    options: &MergeOptions,
) -> usize {
    let mut kinds = Vec::new();
    if options.short_circuit_rules {
        kinds.push(RuleKind::ShortCircuit);
    }
    if options.unrouted_net_rules {
        kinds.push(RuleKind::UnRoutedNet);
    }

    let mut created = 0;
    for kind in kinds {
        for class in table.classes() {
            let covered = rules.of_kind(kind).any(|rule| {
                rule.scope_a
                    .single_class()
                    .is_some_and(|c| NetClassRegistry::normalize(c) == NetClassRegistry::normalize(class))
            });
            if covered {
                continue;
            }
            let scope = Scope::net_class(class);
            let built = match kind {
                RuleKind::ShortCircuit => append_rule(
                    rules,
                    warnings,
                    format!("ShortCircuit_{}", sanitize(class)),
                    |name| {
                        Ok(Rule::short_circuit(name, scope, None)?
                            .with_comment(format!("Short circuit rule for {}", class)))
                    },
                ),
                _ => append_rule(
                    rules,
                    warnings,
                    format!("UnroutedNet_{}", sanitize(class)),
                    |name| {
                        Ok(Rule::unrouted_net(name, scope, None)?
                            .with_comment(format!("Unrouted net rule for {}", class)))
                    },
                ),
            };
            if built {
                created += 1;
            }
        }
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clearance_rule(name: &str, a: Scope, b: Scope, mil: f64, priority: u32) -> Rule {
        Rule::electrical_clearance(name, a, b, Clearance::new(mil, ClearanceUnit::Mil))
            .unwrap()
            .with_priority(priority)
    }

    fn nc(name: &str) -> Scope {
        Scope::net_class(name)
    }

    #[test]
    fn test_explicit_rules_before_all_rules() {
        let rules: RuleSet = vec![
            clearance_rule("Default", Scope::All, Scope::All, 6.0, 1),
            clearance_rule("HV_LV", nc("HV"), nc("LV"), 25.0, 2),
            clearance_rule("LV_GND", nc("LV"), nc("GND"), 8.0, 3),
        ]
        .into_iter()
        .collect();

        let (table, warnings) = rules_to_pivot(&rules, ClearanceUnit::Mil);
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert_eq!(table.classes(), vec!["HV", "LV", "GND"]);
        assert_eq!(table.value("HV", "LV").map(|c| c.value), Some(25.0));
        assert_eq!(table.value("GND", "LV").map(|c| c.value), Some(8.0));
        assert_eq!(table.value("HV", "GND").map(|c| c.value), Some(6.0));
    }

    #[test]
    fn test_first_explicit_rule_wins() {
        let rules: RuleSet = vec![
            clearance_rule("Later", nc("A"), nc("B"), 20.0, 2),
            clearance_rule("Earlier", nc("B"), nc("A"), 10.0, 1),
        ]
        .into_iter()
        .collect();
        let (table, warnings) = rules_to_pivot(&rules, ClearanceUnit::Mil);
        assert_eq!(table.value("A", "B").map(|c| c.value), Some(10.0));
        assert_eq!(
            warnings,
            vec![BridgeWarning::Shadowed {
                rule: "Later".to_string()
            }]
        );
    }

    #[test]
    fn test_skipped_rules_are_reported() {
        let rules: RuleSet = vec![
            clearance_rule("Off", nc("A"), nc("B"), 10.0, 1).with_enabled(false),
            clearance_rule("Query", Scope::Query("InComponent('U1')".into()), nc("B"), 10.0, 2),
            clearance_rule("Self", nc("A"), nc("A"), 10.0, 3),
        ]
        .into_iter()
        .collect();
        let (table, warnings) = rules_to_pivot(&rules, ClearanceUnit::Mil);
        assert!(table.is_empty());
        assert!(matches!(warnings[0], BridgeWarning::DisabledRule { .. }));
        assert!(matches!(warnings[1], BridgeWarning::UnresolvableScope { .. }));
        assert!(matches!(warnings[2], BridgeWarning::UnresolvableScope { .. }));
    }

    #[test]
    fn test_values_converted_to_target_unit() {
        let rules: RuleSet = vec![clearance_rule("R1", nc("A"), nc("B"), 10.0, 1)]
            .into_iter()
            .collect();
        let (table, _) = rules_to_pivot(&rules, ClearanceUnit::Mm);
        assert_eq!(
            table.value("A", "B"),
            Some(Clearance::new(0.254, ClearanceUnit::Mm))
        );
    }

    #[test]
    fn test_context_classes_extend_axis() {
        let rules: RuleSet = vec![clearance_rule("R1", nc("A"), nc("B"), 10.0, 1)]
            .into_iter()
            .collect();
        let mut ctx = ConversionContext::new(ClearanceUnit::Mil).with_classes(["Z"]);
        let (table, _) = rules_to_pivot_with(&rules, &mut ctx);
        assert_eq!(table.classes(), vec!["Z", "A", "B"]);
    }

    #[test]
    fn test_pivot_to_rules_fresh() {
        let mut table = PivotTable::with_classes(["Power Rail", "GND"]);
        table.set("Power Rail", "GND", Clearance::new(0.2, ClearanceUnit::Mm));
        let (rules, warnings) = pivot_to_rules(&table, None, &MergeOptions::default());
        assert!(warnings.is_empty());
        let rule = rules.get("Clearance_Power_Rail_to_GND").unwrap();
        assert_eq!(rule.scope(), (&nc("Power Rail"), &nc("GND")));
        assert_eq!(rule.priority, 1);
        assert_eq!(
            rule.comment.as_deref(),
            Some("Clearance between NetClass 'Power Rail' and NetClass 'GND'")
        );
    }

    #[test]
    fn test_merge_updates_matching_rule_in_its_unit() {
        let existing: RuleSet = vec![
            clearance_rule("Keep", nc("B"), nc("A"), 10.0, 1),
            Rule::short_circuit("Shorts", Scope::All, None)
                .unwrap()
                .with_priority(2),
        ]
        .into_iter()
        .collect();
        let mut table = PivotTable::new();
        table.set("a", "b", Clearance::new(0.3048, ClearanceUnit::Mm));

        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &MergeOptions::default());
        assert_eq!(rules.len(), 2);
        let rule = rules.get("Keep").unwrap();
        let value = rule.min_clearance().unwrap();
        assert_eq!(value.unit, ClearanceUnit::Mil);
        assert!((value.value - 12.0).abs() < 1e-9);
        assert!(matches!(
            warnings.as_slice(),
            [BridgeWarning::ClearanceMismatch { kept: MergePolicy::PivotWins, .. }]
        ));
        assert_eq!(rules.get("Shorts"), existing.get("Shorts"));
    }

    #[test]
    fn test_merge_rule_wins_keeps_value() {
        let existing: RuleSet = vec![clearance_rule("Keep", nc("A"), nc("B"), 10.0, 1)]
            .into_iter()
            .collect();
        let mut table = PivotTable::new();
        table.set("A", "B", Clearance::new(12.0, ClearanceUnit::Mil));
        let options = MergeOptions {
            policy: MergePolicy::RuleWins,
            ..MergeOptions::default()
        };
        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &options);
        assert_eq!(rules, existing);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_merge_reports_orphans_and_dedupes_names() {
        let existing: RuleSet = vec![
            clearance_rule("Orphan", nc("X"), nc("Y"), 10.0, 1),
            clearance_rule("Clearance_A_to_B", Scope::All, nc("B"), 10.0, 2),
        ]
        .into_iter()
        .collect();
        let mut table = PivotTable::new();
        table.set("A", "B", Clearance::new(5.0, ClearanceUnit::Mil));
        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &MergeOptions::default());

        assert_eq!(rules.len(), 3);
        let added = rules.get("Clearance_A_to_B_2").unwrap();
        assert_eq!(added.priority, 3);
        assert!(rules.get("Orphan").is_some());
        assert_eq!(
            warnings,
            vec![BridgeWarning::Orphaned {
                rule: "Orphan".to_string(),
                class_a: "X".to_string(),
                class_b: "Y".to_string(),
            }]
        );
    }

    #[test]
    fn test_disabled_rule_untouched_by_round_trip() {
        let existing: RuleSet = vec![
            clearance_rule("Default", Scope::All, Scope::All, 6.0, 1),
            clearance_rule("Off", nc("A"), nc("B"), 10.0, 2).with_enabled(false),
        ]
        .into_iter()
        .collect();
        let (table, _) = rules_to_pivot(&existing, ClearanceUnit::Mil);
        assert_eq!(table.value("A", "B").map(|c| c.value), Some(6.0));

        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &MergeOptions::default());
        assert_eq!(rules, existing);
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_multi_class_rule_supplies_its_pairs() {
        let multi = Scope::NetClasses(vec!["A".into(), "B".into()]);
        let existing: RuleSet = vec![clearance_rule("Multi", multi, nc("C"), 10.0, 1)]
            .into_iter()
            .collect();
        let (table, _) = rules_to_pivot(&existing, ClearanceUnit::Mil);
        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &MergeOptions::default());
        assert_eq!(rules, existing);
        assert!(warnings.is_empty(), "{:?}", warnings);

        let mut edited = table.clone();
        edited.set("A", "C", Clearance::new(12.0, ClearanceUnit::Mil));
        let (rules, warnings) = pivot_to_rules(&edited, Some(&existing), &MergeOptions::default());
        assert_eq!(rules, existing);
        assert!(matches!(
            warnings.as_slice(),
            [BridgeWarning::SharedScope { rule, class_a, .. }] if rule == "Multi" && class_a == "A"
        ));
    }

    #[test]
    fn test_multi_class_rule_without_cells_is_orphaned() {
        let multi = Scope::NetClasses(vec!["A".into(), "B".into()]);
        let existing: RuleSet = vec![clearance_rule("Multi", multi, nc("C"), 10.0, 1)]
            .into_iter()
            .collect();
        let mut table = PivotTable::new();
        table.set("X", "Y", Clearance::new(5.0, ClearanceUnit::Mil));
        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &MergeOptions::default());
        assert_eq!(rules.len(), 2);
        assert_eq!(
            warnings,
            vec![BridgeWarning::Orphaned {
                rule: "Multi".to_string(),
                class_a: "A;B".to_string(),
                class_b: "C".to_string(),
            }]
        );
    }

    #[test]
    fn test_all_rule_with_same_value_adds_nothing() {
        let existing: RuleSet = vec![clearance_rule("Default", Scope::All, Scope::All, 6.0, 1)]
            .into_iter()
            .collect();
        let mut table = PivotTable::new();
        table.set("A", "B", Clearance::new(6.0, ClearanceUnit::Mil));
        table.set("A", "C", Clearance::new(9.0, ClearanceUnit::Mil));
        let (rules, warnings) = pivot_to_rules(&table, Some(&existing), &MergeOptions::default());
        assert!(warnings.is_empty());
        let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Default", "Clearance_A_to_C"]);
    }

    #[test]
    fn test_unquotable_class_name_rejected() {
        let mut table = PivotTable::new();
        table.set("Bob's", "GND", Clearance::new(5.0, ClearanceUnit::Mil));
        table.set("VCC", "GND", Clearance::new(6.0, ClearanceUnit::Mil));
        let (rules, warnings) = pivot_to_rules(&table, None, &MergeOptions::default());

        let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["Clearance_GND_to_VCC"]);
        assert!(matches!(
            warnings.as_slice(),
            [BridgeWarning::Rejected { rule, .. }] if rule == "Clearance_Bob_s_to_GND"
        ));

        let reparsed = crate::rul::parse_rul(&crate::rul::serialize_rul(&rules), &Default::default());
        assert_eq!(reparsed.rules, rules);
    }

    #[test]
    fn test_per_class_rules_generated_once() {
        let mut table = PivotTable::with_classes(["PWR", "GND"]);
        table.set("PWR", "GND", Clearance::new(8.0, ClearanceUnit::Mil));
        let options = MergeOptions {
            short_circuit_rules: true,
            unrouted_net_rules: true,
            ..MergeOptions::default()
        };
        let (rules, warnings) = pivot_to_rules(&table, None, &options);
        assert!(warnings.is_empty());
        let names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            vec![
                "Clearance_PWR_to_GND",
                "ShortCircuit_PWR",
                "ShortCircuit_GND",
                "UnroutedNet_PWR",
                "UnroutedNet_GND"
            ]
        );
        let shorts = rules.get("ShortCircuit_GND").unwrap();
        assert_eq!(shorts.scope(), (&nc("GND"), &Scope::All));
        assert_eq!(shorts.priority, 3);
        assert_eq!(shorts.comment.as_deref(), Some("Short circuit rule for GND"));

        let (again, _) = pivot_to_rules(&table, Some(&rules), &options);
        assert_eq!(again, rules);
    }

    #[test]
    fn test_inconsistent_pairs_skipped() {
        let mut table = PivotTable::new();
        table.set("A", "B", Clearance::new(5.0, ClearanceUnit::Mil));
        table.set("B", "A", Clearance::new(6.0, ClearanceUnit::Mil));
        let (rules, warnings) = pivot_to_rules(&table, None, &MergeOptions::default());
        assert!(rules.is_empty());
        assert_eq!(
            warnings,
            vec![BridgeWarning::Inconsistent {
                class_a: "A".to_string(),
                class_b: "B".to_string()
            }]
        );
    }
}
