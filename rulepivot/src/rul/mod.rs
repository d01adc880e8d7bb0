//! .RUL rule file format
//!
//! A file is a sequence of blocks:
//!
//! ```text
//! Rule
//! {
//!     Name = 'R1'
//!     Enabled = 'true'
//!     Priority = 1
//!     RuleKind = 'Clearance'
//!     MinimumClearance = 10
//!     MinimumClearanceType = 'mil'
//!     SourceScope = InNetClass('ClassA')
//!     TargetScope = InNetClass('ClassB')
//! }
//! ```
//!
//! Lines starting with `#` outside a block are comments.

pub mod parser;
pub mod writer;

pub use parser::{parse_rul, ParseOptions, ParsedRules, COMMENT_MARKER};
pub use writer::{serialize_rul, RulWriter};
