//! RulePivot - net-class clearance rules as pivot tables
//!
//! This library converts PCB clearance rules between the .RUL rule file
//! format and a square pivot table of net class × net class clearances.
//!
//! # Quick Start
//!
//! ```
//! use rulepivot::{parse_rul, render_pivot, rules_to_pivot, ClearanceUnit, ParseOptions};
//!
//! let text = "Rule\n{\n    Name = 'R1'\n    RuleKind = 'Clearance'\n    MinimumClearance = 10\n    \
//!             MinimumClearanceType = 'mil'\n    SourceScope = InNetClass('A')\n    \
//!             TargetScope = InNetClass('B')\n}\n";
//!
//! let parsed = parse_rul(text, &ParseOptions::default());
//! let (table, _warnings) = rules_to_pivot(&parsed.rules, ClearanceUnit::Mm);
//! let rendered = render_pivot(&table, ClearanceUnit::Mm);
//! assert_eq!(rendered.cells[1][2], rulepivot::Cell::Number(0.254));
//! ```
//!
//! # Features
//!
//! - **Rule files**: lossless parse and serialize, unknown blocks kept verbatim
//! - **Pivot tables**: header validation, sparse cells, unit detection
//! - **Merging**: pivot edits applied to an existing rule file in place

pub mod bridge;
pub mod config;
pub mod core;
pub mod model;
pub mod pivot;
pub mod rul;
pub mod units;

// Re-export main types
pub use bridge::{
    pivot_to_rules, rules_to_pivot, rules_to_pivot_with, BridgeWarning, ConversionContext,
    MergeOptions, MergePolicy,
};
pub use config::{ConfigError, Preferences};
pub use core::{
    CheckResult, ConversionOptions, PivotConversion, RulConversion, RulePivotCore, RulePivotError,
    RuleStats,
};
pub use model::{Clearance, Rule, RuleError, RuleKind, RulePayload, RuleSet, Scope};
pub use pivot::{
    parse_pivot, render_pivot, Cell, NetClassRegistry, ParsedPivot, PivotCell, PivotError,
    PivotTable, PivotWarning, RenderedPivot,
};
pub use rul::{parse_rul, serialize_rul, ParseOptions, ParsedRules, RulWriter};
pub use units::{convert, detect_unit, ClearanceUnit, DetectionSource, UnitDetection, UnitError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Cell, Clearance, ClearanceUnit, ConversionOptions, PivotTable, Rule, RuleError,
        RulePivotCore, RulePivotError, RuleSet, Scope,
    };
}
