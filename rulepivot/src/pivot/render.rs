//! [`PivotTable`] → raw cell array

use serde::Serialize;

use super::{Cell, PivotCell, PivotTable, PivotWarning};
use crate::units::ClearanceUnit;

/// Output of [`render_pivot`].
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPivot {
    pub cells: Vec<Vec<Cell>>,
    pub warnings: Vec<PivotWarning>,
}

/// Corner cell text for a rendered table.
pub fn corner_label(unit: ClearanceUnit) -> String {
    format!("Clearance ({})", unit)
}

/// Render a pivot table as a square cell array in `target_unit`.
///
/// Each authoritative pair is written to both (A, B) and (B, A). The
/// diagonal and unset pairs stay empty. Inconsistent pairs keep their two
/// original values and are reported as warnings.
pub fn render_pivot(table: &PivotTable, target_unit: ClearanceUnit) -> RenderedPivot {
    let classes = table.classes();
    let size = classes.len() + 1;
    let mut cells = vec![vec![Cell::Empty; size]; size];

    cells[0][0] = Cell::Text(corner_label(target_unit));
    for (index, class) in classes.iter().enumerate() {
        cells[0][index + 1] = Cell::Text(class.to_string());
        cells[index + 1][0] = Cell::Text(class.to_string());
    }

    let registry = table.registry();
    let place = |cells: &mut Vec<Vec<Cell>>, row: &str, col: &str, value: f64| {
        if let (Some(r), Some(c)) = (registry.index_of(row), registry.index_of(col)) {
            cells[r + 1][c + 1] = Cell::Number(value);
        }
    };

    for pair in table.pairs() {
        let value = pair.clearance.to_unit(target_unit).value;
        place(&mut cells, &pair.class_a, &pair.class_b, value);
        place(&mut cells, &pair.class_b, &pair.class_a, value);
    }

    let mut warnings = Vec::new();
    for (forward, backward) in table.inconsistent_values() {
        let converted = |cell: &PivotCell| cell.clearance().to_unit(target_unit);
        place(&mut cells, &forward.row_class, &forward.col_class, converted(&forward).value);
        place(&mut cells, &backward.row_class, &backward.col_class, converted(&backward).value);
        warnings.push(PivotWarning::Inconsistent {
            row: forward.row_class.clone(),
            column: forward.col_class.clone(),
            forward: converted(&forward),
            backward: converted(&backward),
        });
    }

    RenderedPivot { cells, warnings }
}
