//! Raw cell array → [`PivotTable`]

use std::collections::HashSet;

use serde::Serialize;

use super::{Cell, PivotError, PivotTable, PivotWarning};
use crate::model::Clearance;
use crate::pivot::registry::NetClassRegistry;
use crate::rul::parser::parse_number_with_unit;
use crate::units::{detect_unit, ClearanceUnit, UnitDetection};

/// Output of [`parse_pivot`].
#[derive(Debug, Clone, Serialize)]
pub struct ParsedPivot {
    pub table: PivotTable,
    /// Unit used for cells without their own suffix.
    pub detection: UnitDetection,
    pub warnings: Vec<PivotWarning>,
}

/// A value cell before the table unit is known.
struct RawValue {
    row: usize,
    col: usize,
    value: f64,
    unit: Option<ClearanceUnit>,
}

/// Parse a 2-D cell array into a pivot table.
///
/// The first row and column hold class names and the corner cell may name
/// the unit (`"Clearance (mm)"`). Blank and non-numeric value cells leave the
/// pair unset. `unit_hint` overrides detection when the caller already knows
/// the unit.
pub fn parse_pivot(
    cells: &[Vec<Cell>],
    unit_hint: Option<ClearanceUnit>,
) -> Result<ParsedPivot, PivotError> {
    let rows = trim(cells);
    let header_width = rows.first().map(|row| used_width(row)).unwrap_or(0);
    if rows.len() < 2 || header_width < 2 {
        return Err(PivotError::TooSmall {
            rows: rows.len(),
            columns: header_width,
        });
    }
    for (index, row) in rows.iter().enumerate() {
        let len = used_width(row);
        if len > header_width {
            return Err(PivotError::Ragged {
                row: index,
                len,
                width: header_width,
            });
        }
    }
    if rows.len() != header_width {
        return Err(PivotError::NonSquare {
            rows: rows.len() - 1,
            columns: header_width - 1,
        });
    }

    let classes = read_headers(rows)?;
    let corner = rows[0].first().and_then(Cell::as_text);

    let mut warnings = Vec::new();
    let mut raw_values = Vec::new();
    for (r, row) in rows.iter().enumerate().skip(1) {
        for c in 1..header_width {
            if r == c {
                continue;
            }
            let parsed = match row.get(c) {
                None | Some(Cell::Empty) => None,
                Some(Cell::Number(value)) => Some((*value, None)),
                Some(Cell::Text(text)) if text.trim().is_empty() => None,
                Some(Cell::Text(text)) => {
                    let parsed = parse_number_with_unit(text);
                    if parsed.is_none() {
                        warnings.push(PivotWarning::NonNumeric {
                            row: classes[r - 1].clone(),
                            column: classes[c - 1].clone(),
                            text: text.trim().to_string(),
                        });
                    }
                    parsed
                }
            };
            if let Some((value, unit)) = parsed {
                raw_values.push(RawValue {
                    row: r - 1,
                    col: c - 1,
                    value,
                    unit,
                });
            }
        }
    }

    let detection = match unit_hint {
        Some(unit) => UnitDetection::caller(unit),
        None => {
            let plain: Vec<f64> = raw_values
                .iter()
                .filter(|raw| raw.unit.is_none())
                .map(|raw| raw.value)
                .collect();
            detect_unit(&plain, corner.as_deref())
        }
    };
    if detection.is_guess() {
        tracing::info!(
            "Pivot unit not given, assuming {} ({:?})",
            detection.unit,
            detection.source
        );
    }

    let mut table = PivotTable::with_classes(classes.iter().map(String::as_str));
    for raw in raw_values {
        let row = &classes[raw.row];
        let column = &classes[raw.col];
        if !raw.value.is_finite() || raw.value <= 0.0 {
            warnings.push(PivotWarning::InvalidValue {
                row: row.clone(),
                column: column.clone(),
                value: raw.value,
            });
            continue;
        }
        let unit = raw.unit.unwrap_or(detection.unit);
        table.set(row, column, Clearance::new(raw.value, unit));
    }

    for (forward, backward) in table.inconsistent_values() {
        tracing::warn!(
            "Pivot cells {}/{} disagree: {} vs {}",
            forward.row_class,
            forward.col_class,
            forward.clearance(),
            backward.clearance()
        );
        warnings.push(PivotWarning::Inconsistent {
            row: forward.row_class.clone(),
            column: forward.col_class.clone(),
            forward: forward.clearance(),
            backward: backward.clearance(),
        });
    }

    tracing::debug!(
        "Parsed pivot: {} classes, {} cells, {} warnings",
        classes.len(),
        table.len(),
        warnings.len()
    );

    Ok(ParsedPivot {
        table,
        detection,
        warnings,
    })
}

/// Drop trailing rows that hold nothing.
fn trim(cells: &[Vec<Cell>]) -> &[Vec<Cell>] {
    let used = cells
        .iter()
        .rposition(|row| used_width(row) > 0)
        .map_or(0, |last| last + 1);
    &cells[..used]
}

/// Row length ignoring trailing empty cells.
fn used_width(row: &[Cell]) -> usize {
    row.iter().rposition(|cell| !cell.is_empty()).map_or(0, |last| last + 1)
}

/// Validate both header axes and return the class names in order.
fn read_headers(rows: &[Vec<Cell>]) -> Result<Vec<String>, PivotError> {
    let mut classes = Vec::with_capacity(rows.len() - 1);
    let mut seen = HashSet::new();
    for (index, cell) in rows[0].iter().enumerate().skip(1).take(rows.len() - 1) {
        let name = cell.as_text().ok_or(PivotError::EmptyHeader {
            axis: "column",
            index,
        })?;
        if !seen.insert(NetClassRegistry::normalize(&name)) {
            return Err(PivotError::DuplicateHeader { name });
        }
        classes.push(name);
    }

    for (index, row) in rows.iter().enumerate().skip(1) {
        let name = row
            .first()
            .and_then(Cell::as_text)
            .ok_or(PivotError::EmptyHeader { axis: "row", index })?;
        let column = &classes[index - 1];
        if NetClassRegistry::normalize(&name) != NetClassRegistry::normalize(column) {
            return Err(PivotError::HeaderMismatch {
                index,
                row: name,
                column: column.clone(),
            });
        }
    }
    Ok(classes)
}
