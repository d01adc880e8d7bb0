//! Pivot table representation of clearance rules
//!
//! A pivot table is a square matrix: both axes list the same net classes in
//! the same order and each off-diagonal cell holds the clearance between the
//! row class and the column class.
//!
//! ```text
//!  Clearance (mil) │ HV   LV   GND
//! ─────────────────┼───────────────
//!  HV              │      25   25
//!  LV              │ 25         8
//!  GND             │ 25    8
//! ```

pub mod normalize;
pub mod registry;
pub mod render;

pub use normalize::{parse_pivot, ParsedPivot};
pub use registry::NetClassRegistry;
pub use render::{render_pivot, RenderedPivot};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::model::{format_number, Clearance};
use crate::units::ClearanceUnit;

/// Structural problems that make a raw cell array unusable as a pivot
/// table. There is no safe partial result, so these abort the parse.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PivotError {
    #[error("Malformed pivot table: need at least one header row and column plus one class, got {rows}x{columns}")]
    TooSmall { rows: usize, columns: usize },
    #[error("Malformed pivot table: row {row} has {len} cells but the header row has {width}")]
    Ragged { row: usize, len: usize, width: usize },
    #[error("Malformed pivot table: {rows} row classes but {columns} column classes")]
    NonSquare { rows: usize, columns: usize },
    #[error("Malformed pivot table: empty header at {axis} {index}")]
    EmptyHeader { axis: &'static str, index: usize },
    #[error("Malformed pivot table: duplicate class '{name}' in column headers")]
    DuplicateHeader { name: String },
    #[error("Malformed pivot table: row header '{row}' does not match column header '{column}' at position {index}")]
    HeaderMismatch {
        index: usize,
        row: String,
        column: String,
    },
}

/// Non-fatal findings reported next to a pivot result.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PivotWarning {
    #[error("Ignoring non-numeric cell {row}/{column}: {text}")]
    NonNumeric {
        row: String,
        column: String,
        text: String,
    },
    #[error("Ignoring clearance {value} at {row}/{column}: must be positive and finite")]
    InvalidValue { row: String, column: String, value: f64 },
    #[error("Inconsistent clearance between {row} and {column}: {forward} vs {backward}")]
    Inconsistent {
        row: String,
        column: String,
        forward: Clearance,
        backward: Clearance,
    },
}

/// One raw spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Cell content as header text.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Cell::Number(value) => Some(format_number(*value)),
            _ => None,
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(value) => f.write_str(&format_number(*value)),
            Cell::Text(text) => f.write_str(text),
            Cell::Empty => Ok(()),
        }
    }
}

/// Clearance between a row class and a column class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotCell {
    pub row_class: String,
    pub col_class: String,
    pub value: f64,
    pub unit: ClearanceUnit,
}

impl PivotCell {
    pub fn clearance(&self) -> Clearance {
        Clearance::new(self.value, self.unit)
    }
}

/// The authoritative clearance for an unordered class pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotPair {
    pub class_a: String,
    pub class_b: String,
    pub clearance: Clearance,
}

/// Square clearance matrix over an ordered list of net classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(into = "PivotTableView")]
pub struct PivotTable {
    registry: NetClassRegistry,
    cells: BTreeMap<(usize, usize), Clearance>,
    /// Pairs (low index, high index) whose two directions disagree.
    inconsistent: BTreeSet<(usize, usize)>,
}

impl PivotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classes<'a>(classes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut table = Self::new();
        for class in classes {
            table.add_class(class);
        }
        table
    }

    pub fn add_class(&mut self, name: &str) -> usize {
        self.registry.register(name)
    }

    pub fn registry(&self) -> &NetClassRegistry {
        &self.registry
    }

    /// Header names in axis order.
    pub fn classes(&self) -> Vec<&str> {
        self.registry.names().collect()
    }

    /// Store the clearance from `row` to `col`, registering unknown
    /// classes. Diagonal entries are ignored and return false.
    pub fn set(&mut self, row: &str, col: &str, clearance: Clearance) -> bool {
        let r = self.add_class(row);
        let c = self.add_class(col);
        if r == c {
            return false;
        }
        self.cells.insert((r, c), clearance);
        self.refresh_consistency(r, c);
        true
    }

    fn refresh_consistency(&mut self, r: usize, c: usize) {
        let key = (r.min(c), r.max(c));
        let disagree = match (self.cells.get(&(r, c)), self.cells.get(&(c, r))) {
            (Some(forward), Some(backward)) => !forward.same_distance(backward),
            _ => false,
        };
        if disagree {
            self.inconsistent.insert(key);
        } else {
            self.inconsistent.remove(&key);
        }
    }

    /// Clearance stored for exactly this direction.
    pub fn get(&self, row: &str, col: &str) -> Option<PivotCell> {
        let r = self.registry.index_of(row)?;
        let c = self.registry.index_of(col)?;
        self.cells.get(&(r, c)).map(|clearance| self.cell_at(r, c, clearance))
    }

    /// Authoritative clearance for the unordered pair, in either direction.
    /// None when absent or inconsistent.
    pub fn value(&self, a: &str, b: &str) -> Option<Clearance> {
        let i = self.registry.index_of(a)?;
        let j = self.registry.index_of(b)?;
        self.pair_value(i, j)
    }

    fn pair_value(&self, i: usize, j: usize) -> Option<Clearance> {
        let key = (i.min(j), i.max(j));
        if i == j || self.inconsistent.contains(&key) {
            return None;
        }
        self.cells
            .get(&key)
            .or_else(|| self.cells.get(&(key.1, key.0)))
            .copied()
    }

    pub fn is_inconsistent(&self, a: &str, b: &str) -> bool {
        match (self.registry.index_of(a), self.registry.index_of(b)) {
            (Some(i), Some(j)) => self.inconsistent.contains(&(i.min(j), i.max(j))),
            _ => false,
        }
    }

    fn cell_at(&self, r: usize, c: usize, clearance: &Clearance) -> PivotCell {
        PivotCell {
            row_class: self.registry.name_at(r).unwrap_or_default().to_string(),
            col_class: self.registry.name_at(c).unwrap_or_default().to_string(),
            value: clearance.value,
            unit: clearance.unit,
        }
    }

    /// Every stored cell, row-major in header order.
    pub fn cells(&self) -> Vec<PivotCell> {
        self.cells
            .iter()
            .map(|(&(r, c), clearance)| self.cell_at(r, c, clearance))
            .collect()
    }

    /// One entry per unordered pair with an authoritative value, in header
    /// order. Inconsistent pairs are left out.
    pub fn pairs(&self) -> Vec<PivotPair> {
        let mut seen = BTreeSet::new();
        let mut pairs = Vec::new();
        for &(r, c) in self.cells.keys() {
            let key = (r.min(c), r.max(c));
            if !seen.insert(key) {
                continue;
            }
            if let Some(clearance) = self.pair_value(key.0, key.1) {
                pairs.push(PivotPair {
                    class_a: self.registry.name_at(key.0).unwrap_or_default().to_string(),
                    class_b: self.registry.name_at(key.1).unwrap_or_default().to_string(),
                    clearance,
                });
            }
        }
        pairs
    }

    /// Class pairs whose two directions disagree, as (row, column) names.
    pub fn inconsistent_pairs(&self) -> Vec<(String, String)> {
        self.inconsistent
            .iter()
            .map(|&(i, j)| {
                (
                    self.registry.name_at(i).unwrap_or_default().to_string(),
                    self.registry.name_at(j).unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    /// Both directions of an inconsistent pair, `(low→high, high→low)`.
    pub(crate) fn inconsistent_values(&self) -> Vec<(PivotCell, PivotCell)> {
        self.inconsistent
            .iter()
            .filter_map(|&(i, j)| {
                let forward = self.cells.get(&(i, j))?;
                let backward = self.cells.get(&(j, i))?;
                Some((self.cell_at(i, j, forward), self.cell_at(j, i, backward)))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Serialized form of [`PivotTable`].
#[derive(Debug, Clone, Serialize)]
pub struct PivotTableView {
    pub classes: Vec<String>,
    pub cells: Vec<PivotCell>,
    pub inconsistent: Vec<(String, String)>,
}

impl From<PivotTable> for PivotTableView {
    fn from(table: PivotTable) -> Self {
        Self {
            classes: table.classes().into_iter().map(str::to_string).collect(),
            cells: table.cells(),
            inconsistent: table.inconsistent_pairs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mil(value: f64) -> Clearance {
        Clearance::new(value, ClearanceUnit::Mil)
    }

    #[test]
    fn test_set_ignores_diagonal() {
        let mut table = PivotTable::new();
        assert!(!table.set("A", "a", mil(5.0)));
        assert!(table.is_empty());
        assert_eq!(table.classes(), vec!["A"]);
    }

    #[test]
    fn test_value_is_direction_independent() {
        let mut table = PivotTable::new();
        table.set("A", "B", mil(5.0));
        assert_eq!(table.value("B", "A"), Some(mil(5.0)));
        assert!(table.get("B", "A").is_none());
        assert_eq!(table.pairs().len(), 1);
    }

    #[test]
    fn test_disagreeing_directions_flagged() {
        let mut table = PivotTable::new();
        table.set("A", "B", mil(5.0));
        table.set("B", "A", mil(6.0));
        assert!(table.is_inconsistent("a", "b"));
        assert_eq!(table.value("A", "B"), None);
        assert!(table.pairs().is_empty());
        assert_eq!(table.inconsistent_values().len(), 1);

        // agreeing after unit normalization clears the flag
        table.set("B", "A", Clearance::new(0.127, ClearanceUnit::Mm));
        assert!(!table.is_inconsistent("A", "B"));
        assert_eq!(table.pairs().len(), 1);
    }

    #[test]
    fn test_cell_json_shapes() {
        let cells: Vec<Cell> = serde_json::from_str(r#"[5, "HV", null, "0.2 mm"]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                Cell::Number(5.0),
                Cell::Text("HV".to_string()),
                Cell::Empty,
                Cell::Text("0.2 mm".to_string())
            ]
        );
        assert_eq!(serde_json::to_string(&Cell::Empty).unwrap(), "null");
    }

    #[test]
    fn test_table_serializes_as_view() {
        let mut table = PivotTable::new();
        table.set("A", "B", mil(5.0));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["classes"], serde_json::json!(["A", "B"]));
        assert_eq!(json["cells"][0]["unit"], "mil");
    }
}
