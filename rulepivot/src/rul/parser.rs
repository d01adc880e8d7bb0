//! .RUL text parser
//!
//! A single pass over the lines with three states:
//!
//! ```text
//! SeekingBlock ──keyword──▶ InBlockHeader ──"{"──▶ InBlockBody ──"}"──▶ SeekingBlock
//! ```
//!
//! Each finished block becomes a typed [`Rule`] when its `RuleKind` is one
//! of the supported kinds, or an opaque rule holding the block text
//! verbatim otherwise. A broken block is reported and skipped; the rest of
//! the file still parses.

use serde::Serialize;

use crate::model::rule::*;
use crate::model::{Clearance, Rule, RuleError, RuleKind, RuleSet, Scope};
use crate::units::ClearanceUnit;

/// Line comment marker outside rule blocks.
pub const COMMENT_MARKER: &str = "#";

const ALT_COMMENT_MARKER: &str = "//";

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Reject a block whose name is already taken instead of letting it
    /// overwrite the earlier rule.
    pub strict_names: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self { strict_names: true }
    }
}

/// Parser output: every rule that could be built, in file order, and the
/// per-block errors encountered along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedRules {
    pub rules: RuleSet,
    pub errors: Vec<RuleError>,
}

impl ParsedRules {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug)]
struct Attribute {
    key: String,
    raw: String,
}

#[derive(Debug)]
struct RawBlock {
    /// None when a `{` appeared without a header keyword.
    keyword: Option<String>,
    start_line: usize,
    lines: Vec<String>,
    attributes: Vec<Attribute>,
    /// Non-attribute content lines inside the body.
    stray_lines: usize,
}

impl RawBlock {
    fn new(keyword: Option<String>, start_line: usize, header: &str) -> Self {
        Self {
            keyword,
            start_line,
            lines: vec![header.to_string()],
            attributes: Vec::new(),
            stray_lines: 0,
        }
    }

    fn raw_text(&self) -> String {
        self.lines.join("\n")
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.raw.as_str())
    }

    fn push_body_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment(trimmed) {
            return;
        }
        match split_attribute(trimmed) {
            Some((key, raw)) => self.attributes.push(Attribute {
                key: key.to_string(),
                raw: raw.to_string(),
            }),
            None => self.stray_lines += 1,
        }
    }
}

enum State {
    SeekingBlock,
    InBlockHeader(RawBlock),
    InBlockBody(RawBlock),
}

/// Parse .RUL text into an ordered rule set.
pub fn parse_rul(text: &str, options: &ParseOptions) -> ParsedRules {
    let mut parser = RulParser {
        options,
        output: ParsedRules::default(),
        blocks_seen: 0,
    };

    let mut state = State::SeekingBlock;
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        state = match state {
            State::SeekingBlock => parser.seek(line, line_no),
            State::InBlockHeader(mut block) => {
                let trimmed = line.trim();
                if trimmed == "{" {
                    block.lines.push(line.to_string());
                    State::InBlockBody(block)
                } else if trimmed.is_empty() || is_comment(trimmed) {
                    block.lines.push(line.to_string());
                    State::InBlockHeader(block)
                } else {
                    parser.output.errors.push(RuleError::Syntax {
                        line: block.start_line,
                        message: format!(
                            "expected '{{' after '{}'",
                            block.keyword.as_deref().unwrap_or_default()
                        ),
                    });
                    parser.seek(line, line_no)
                }
            }
            State::InBlockBody(mut block) => {
                if line.trim() == "}" {
                    block.lines.push(line.to_string());
                    parser.finish(block);
                    State::SeekingBlock
                } else {
                    block.push_body_line(line);
                    State::InBlockBody(block)
                }
            }
        };
    }

    match state {
        State::SeekingBlock => {}
        State::InBlockHeader(block) | State::InBlockBody(block) => {
            parser.output.errors.push(RuleError::Syntax {
                line: block.start_line,
                message: format!(
                    "unterminated block '{}'",
                    block.keyword.as_deref().unwrap_or_default()
                ),
            });
        }
    }

    let output = parser.output;
    tracing::info!(
        "Parsed {} rules ({} errors)",
        output.rules.len(),
        output.errors.len()
    );
    output
}

struct RulParser<'a> {
    options: &'a ParseOptions,
    output: ParsedRules,
    blocks_seen: usize,
}

impl RulParser<'_> {
    fn seek(&mut self, line: &str, line_no: usize) -> State {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment(trimmed) {
            return State::SeekingBlock;
        }

        if trimmed == "{" {
            self.output.errors.push(RuleError::Syntax {
                line: line_no,
                message: "block opened without a header keyword".to_string(),
            });
            return State::InBlockBody(RawBlock::new(None, line_no, line));
        }

        if let Some(keyword) = trimmed.strip_suffix('{').map(str::trim) {
            if is_identifier(keyword) {
                return State::InBlockBody(RawBlock::new(Some(keyword.to_string()), line_no, line));
            }
        }

        if is_identifier(trimmed) {
            return State::InBlockHeader(RawBlock::new(Some(trimmed.to_string()), line_no, line));
        }

        self.output.errors.push(RuleError::Syntax {
            line: line_no,
            message: format!("unexpected text outside a rule block: {}", trimmed),
        });
        State::SeekingBlock
    }

    fn finish(&mut self, block: RawBlock) {
        self.blocks_seen += 1;
        if block.keyword.is_none() {
            return;
        }
        let position = self.output.rules.len() as u32 + 1;
        match build_rule(&block, position, self.blocks_seen) {
            Ok(rule) => self.add(rule),
            Err(err) => {
                tracing::warn!("Skipping rule block at line {}: {}", block.start_line, err);
                self.output.errors.push(err);
            }
        }
    }

    fn add(&mut self, rule: Rule) {
        if !self.output.rules.contains(rule.name()) {
            // name is unique here, push cannot fail
            let _ = self.output.rules.push(rule);
            return;
        }
        if self.options.strict_names {
            self.output.errors.push(RuleError::DuplicateName {
                name: rule.name().to_string(),
            });
        } else {
            tracing::warn!("Rule '{}' redefined; later definition wins", rule.name());
            self.output.rules.insert_or_replace(rule);
        }
    }
}

fn build_rule(block: &RawBlock, position: u32, block_index: usize) -> Result<Rule, RuleError> {
    let keyword = block.keyword.as_deref().unwrap_or_default();
    let name = block.first(KEY_NAME).map(unquote).filter(|n| !n.is_empty());

    if keyword != RULE_KEYWORD {
        let name = name.unwrap_or_else(|| format!("{}_{}", keyword, block_index));
        tracing::debug!("Keeping '{}' block '{}' verbatim", keyword, name);
        return opaque(block, name, position);
    }

    let name = name.ok_or_else(|| RuleError::MissingAttribute {
        rule: format!("<unnamed rule at line {}>", block.start_line),
        attribute: KEY_NAME.to_string(),
    })?;
    let kind_keyword = block
        .first(KEY_RULE_KIND)
        .map(unquote)
        .ok_or_else(|| RuleError::MissingAttribute {
            rule: name.clone(),
            attribute: KEY_RULE_KIND.to_string(),
        })?;

    let kind = match RuleKind::from_keyword(&kind_keyword) {
        Some(kind) => kind,
        None => {
            tracing::debug!("Unsupported rule kind '{}' in '{}'", kind_keyword, name);
            return opaque(block, name, position);
        }
    };

    if block.stray_lines > 0 {
        tracing::warn!(
            "Rule '{}' has {} unrecognized lines; keeping it verbatim",
            name,
            block.stray_lines
        );
        return opaque(block, name, position);
    }

    let attrs = Attrs { block, rule: &name };
    let rule = match kind {
        RuleKind::ElectricalClearance => Rule::electrical_clearance(
            name.as_str(),
            attrs.scope(KEY_SOURCE_SCOPE),
            attrs.scope(KEY_TARGET_SCOPE),
            attrs.distance(KEY_MIN_CLEARANCE, KEY_MIN_CLEARANCE_TYPE)?,
        )?,
        RuleKind::ShortCircuit => Rule::short_circuit(
            name.as_str(),
            attrs.scope(KEY_SCOPE),
            attrs.flag(KEY_ALLOWED)?,
        )?,
        RuleKind::UnRoutedNet => Rule::unrouted_net(
            name.as_str(),
            attrs.scope(KEY_SCOPE),
            attrs.flag(KEY_CHECK_BAD_CONNECTIONS)?,
        )?,
        RuleKind::UnConnectedPin => Rule::unconnected_pin(name.as_str(), attrs.scope(KEY_SCOPE))?,
        RuleKind::ModifiedPolygon => Rule::modified_polygon(
            name.as_str(),
            attrs.scope(KEY_SCOPE),
            attrs.flag(KEY_ALLOW_MODIFIED)?,
            attrs.flag(KEY_ALLOW_SHELVED)?,
        )?,
        RuleKind::CreepageDistance => Rule::creepage_distance(
            name.as_str(),
            attrs.scope(KEY_SOURCE_SCOPE),
            attrs.scope(KEY_TARGET_SCOPE),
            attrs.distance(KEY_MIN_CREEPAGE, KEY_MIN_CREEPAGE_TYPE)?,
        )?,
        RuleKind::Opaque => return opaque(block, name, position),
    };

    let mut rule = rule
        .with_enabled(attrs.bool_or(KEY_ENABLED, true)?)
        .with_priority(attrs.priority()?.unwrap_or(position));
    if let Some(comment) = block.first(KEY_COMMENT) {
        rule = rule.with_comment(unquote(comment));
    }
    rule.extra_attributes = extra_attributes(block, kind);
    rule.omitted_scope_keys = if kind.is_binary() {
        [
            block.first(KEY_SOURCE_SCOPE).is_none(),
            block.first(KEY_TARGET_SCOPE).is_none(),
        ]
    } else {
        [block.first(KEY_SCOPE).is_none(), false]
    };
    Ok(rule)
}

fn opaque(block: &RawBlock, name: String, position: u32) -> Result<Rule, RuleError> {
    let keyword = block.keyword.clone().unwrap_or_default();
    let priority = block
        .first(KEY_PRIORITY)
        .and_then(|p| unquote(p).parse().ok())
        .unwrap_or(position);
    let enabled = block
        .first(KEY_ENABLED)
        .and_then(|e| parse_bool(&unquote(e)))
        .unwrap_or(true);
    Ok(Rule::opaque_with_keyword(name, keyword, block.raw_text())?
        .with_priority(priority)
        .with_enabled(enabled))
}

/// Attributes the typed model does not cover, in file order. Repeated
/// known keys after their first occurrence are kept here too.
fn extra_attributes(block: &RawBlock, kind: RuleKind) -> Vec<(String, String)> {
    let known = known_keys(kind);
    let mut seen: Vec<&str> = Vec::new();
    let mut extras = Vec::new();
    for attr in &block.attributes {
        let key = attr.key.as_str();
        if known.contains(&key) && !seen.contains(&key) {
            seen.push(key);
            continue;
        }
        extras.push((attr.key.clone(), attr.raw.clone()));
    }
    extras
}

fn known_keys(kind: RuleKind) -> Vec<&'static str> {
    let mut keys = vec![KEY_NAME, KEY_ENABLED, KEY_COMMENT, KEY_PRIORITY, KEY_RULE_KIND];
    if kind.is_binary() {
        keys.extend([KEY_SOURCE_SCOPE, KEY_TARGET_SCOPE]);
    } else {
        keys.push(KEY_SCOPE);
    }
    match kind {
        RuleKind::ElectricalClearance => keys.extend([KEY_MIN_CLEARANCE, KEY_MIN_CLEARANCE_TYPE]),
        RuleKind::CreepageDistance => keys.extend([KEY_MIN_CREEPAGE, KEY_MIN_CREEPAGE_TYPE]),
        RuleKind::ShortCircuit => keys.push(KEY_ALLOWED),
        RuleKind::UnRoutedNet => keys.push(KEY_CHECK_BAD_CONNECTIONS),
        RuleKind::ModifiedPolygon => keys.extend([KEY_ALLOW_MODIFIED, KEY_ALLOW_SHELVED]),
        RuleKind::UnConnectedPin | RuleKind::Opaque => {}
    }
    keys
}

/// Typed attribute access for one block.
struct Attrs<'a> {
    block: &'a RawBlock,
    rule: &'a str,
}

impl Attrs<'_> {
    fn scope(&self, key: &str) -> Scope {
        self.block.first(key).map(Scope::parse).unwrap_or_default()
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, RuleError> {
        Ok(self.flag(key)?.unwrap_or(default))
    }

    /// An optional `'true'`/`'false'` attribute.
    fn flag(&self, key: &str) -> Result<Option<bool>, RuleError> {
        match self.block.first(key) {
            None => Ok(None),
            Some(raw) => parse_bool(&unquote(raw)).map(Some).ok_or_else(|| {
                RuleError::malformed(self.rule, format!("{} must be 'true' or 'false', got {}", key, raw))
            }),
        }
    }

    fn priority(&self) -> Result<Option<u32>, RuleError> {
        match self.block.first(KEY_PRIORITY) {
            None => Ok(None),
            Some(raw) => unquote(raw).parse().map(Some).map_err(|_| {
                RuleError::malformed(self.rule, format!("invalid {} value {}", KEY_PRIORITY, raw))
            }),
        }
    }

    /// A required distance attribute with its optional unit attribute. The
    /// value may carry its own unit suffix (`10mil`), which takes precedence.
    fn distance(&self, value_key: &str, unit_key: &str) -> Result<Clearance, RuleError> {
        let raw = self
            .block
            .first(value_key)
            .ok_or_else(|| RuleError::MissingAttribute {
                rule: self.rule.to_string(),
                attribute: value_key.to_string(),
            })?;

        let declared = match self.block.first(unit_key) {
            None => ClearanceUnit::Mil,
            Some(unit) => ClearanceUnit::from_label(&unquote(unit)).ok_or_else(|| {
                RuleError::malformed(self.rule, format!("unknown unit {} for {}", unit, unit_key))
            })?,
        };

        let (value, suffix_unit) = parse_number_with_unit(&unquote(raw)).ok_or_else(|| {
            RuleError::malformed(self.rule, format!("invalid {} value {}", value_key, raw))
        })?;
        Ok(Clearance::new(value, suffix_unit.unwrap_or(declared)))
    }
}

/// Parse `10`, `0.254`, `10mil` or `0.2 mm`.
pub(crate) fn parse_number_with_unit(text: &str) -> Option<(f64, Option<ClearanceUnit>)> {
    let text = text.trim();
    if let Ok(value) = text.parse::<f64>() {
        return Some((value, None));
    }
    let split = text.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = text.split_at(split);
    let value = number.trim().parse::<f64>().ok()?;
    let unit = ClearanceUnit::from_label(unit)?;
    Some((value, Some(unit)))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Strip one pair of surrounding single or double quotes.
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    raw.to_string()
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with(COMMENT_MARKER) || trimmed.starts_with(ALT_COMMENT_MARKER)
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn split_attribute(trimmed: &str) -> Option<(&str, &str)> {
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if is_identifier(key) {
        Some((key, value.trim()))
    } else {
        None
    }
}
