//! Component validation against the catalog.
//!
//! Exact canonical matches win outright, then aliases, then the name is
//! reported invalid together with up to five suggestions.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::{Catalog, Suggestion};

/// Validation outcome for one requested name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Name as requested
    pub requested: String,
    /// Whether the name resolves to a known component
    pub valid: bool,
    /// Canonical spelling, when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    /// Home module group, when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_group: Option<String>,
    /// Full import path (`<namespace>.<module_group>`), when valid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
    /// Alias relationship, when resolved through an alias
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Error message, when invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Replacement candidates, when invalid
    pub suggestions: Vec<Suggestion>,
}

impl ValidationResult {
    /// Top suggestion, if any.
    pub fn best_suggestion(&self) -> Option<&Suggestion> {
        self.suggestions.first()
    }
}

/// Results for a batch of names, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchValidation {
    /// One result per distinct requested name
    pub results: Vec<ValidationResult>,
    pub total: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl BatchValidation {
    /// Look up the result for a requested name.
    pub fn get(&self, name: &str) -> Option<&ValidationResult> {
        self.index.get(name).map(|&i| &self.results[i])
    }

    /// Invalid results, in request order.
    pub fn invalid(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.valid)
    }

    pub fn all_valid(&self) -> bool {
        self.invalid_count == 0
    }
}

/// Borrowing validator over a shared catalog.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    catalog: &'a Catalog,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Validate a single component name.
    #[must_use]
    pub fn validate(&self, name: &str) -> ValidationResult {
        if let Some(entry) = self.catalog.lookup_canonical(name) {
            return ValidationResult {
                requested: name.to_string(),
                valid: true,
                canonical: Some(entry.canonical_name.clone()),
                module_group: Some(entry.module_group.clone()),
                import_path: Some(self.catalog.import_path(entry)),
                note: None,
                error: None,
                suggestions: Vec::new(),
            };
        }

        if let Some(entry) = self.catalog.lookup_alias(name) {
            return ValidationResult {
                requested: name.to_string(),
                valid: true,
                canonical: Some(entry.canonical_name.clone()),
                module_group: Some(entry.module_group.clone()),
                import_path: Some(self.catalog.import_path(entry)),
                note: Some(format!("'{}' is an alias of '{}'", name, entry.canonical_name)),
                error: None,
                suggestions: Vec::new(),
            };
        }

        ValidationResult {
            requested: name.to_string(),
            valid: false,
            canonical: None,
            module_group: None,
            import_path: None,
            note: None,
            error: Some(format!(
                "Component '{}' not found in {} library",
                name,
                self.catalog.provider()
            )),
            suggestions: self.catalog.suggest(name),
        }
    }

    /// Validate a batch of names. Repeated names are validated once.
    #[must_use]
    pub fn validate_many<S: AsRef<str>>(&self, names: &[S]) -> BatchValidation {
        let mut batch = BatchValidation::default();
        for name in names {
            let name = name.as_ref();
            if batch.index.contains_key(name) {
                continue;
            }
            let result = self.validate(name);
            if result.valid {
                batch.valid_count += 1;
            } else {
                batch.invalid_count += 1;
            }
            batch.index.insert(name.to_string(), batch.results.len());
            batch.results.push(result);
        }
        batch.total = batch.results.len();

        debug_assert_eq!(batch.total, batch.valid_count + batch.invalid_count);
        tracing::debug!(
            total = batch.total,
            valid = batch.valid_count,
            invalid = batch.invalid_count,
            "validated components"
        );
        batch
    }
}
