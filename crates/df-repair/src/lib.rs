//! # df-repair
//!
//! Deterministic repair of generated diagram source.
//!
//! The fixer never reparses the text with regular expressions as a whole.
//! Source is lexed once into a line model ([`SourceModel`]), each rule edits
//! that model, and the model renders back. Untouched lines come back
//! byte-for-byte, string literals and comments are never rewritten, and
//! running the fixer over its own output changes nothing.
//!
//! ```text
//! source ──> SourceModel ──> synonym ──> relocation ──> replacement
//!                                                            │
//!            corrected <── whitespace <── diagram-options <── removal
//! ```

pub mod fixer;
pub mod rules;
pub mod source;
pub mod tokens;

pub use fixer::{AutoFixer, FixRecord, FixResult};
pub use rules::{RepairContext, RepairRule};
pub use source::{LineKind, SourceLine, SourceModel};
