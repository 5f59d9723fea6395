//! # df-core
//!
//! Component catalog, validator, reference extractor and scoring for
//! generated diagram source.
//!
//! ```text
//! source text ──> extract_references ──> Validator::validate_many ──> ValidationReport
//!                                              │
//!                                        ┌─────┴─────┐
//!                                        ▼           ▼
//!                                     Catalog   CorrectionTable
//!                                  (canonical,   (misspelling ->
//!                                  alias, keyword) canonical)
//! ```
//!
//! The catalog is immutable after load. Everything in this crate is a pure
//! function over it, so one `Arc<Catalog>` serves any number of concurrent
//! requests.

pub mod architecture;
pub mod catalog;
pub mod corrections;
pub mod extract;
pub mod report;
pub mod validator;

pub use architecture::{compose_source, suggest_for_description, ComponentSuggestion};
pub use catalog::{Catalog, CatalogEntry, CatalogError, Suggestion, SUGGESTIONS_MAX};
pub use corrections::CorrectionTable;
pub use extract::{
    extract_references, parse_import, references_in_namespace, structural_warnings, ImportStatement,
    ImportedName, Reference,
};
pub use report::{score, ValidationReport, NO_COMPONENTS_WARNING};
pub use validator::{BatchValidation, ValidationResult, Validator};
