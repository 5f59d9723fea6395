//! Validity scoring and the structured report handed to callers.

use serde::Serialize;

use crate::validator::BatchValidation;

/// Warning emitted when a source references no catalog components.
pub const NO_COMPONENTS_WARNING: &str = "No components detected";

/// Percentage of valid references, rounded. Zero references score 100.
#[must_use]
pub fn score(valid: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    debug_assert!(valid <= total);
    let pct = (100.0 * valid.min(total) as f64 / total as f64).round();
    pct as u8
}

/// Structured validation report for one source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// 0..=100
    pub score: u8,
    pub total: usize,
    pub valid_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    /// Build a report from batch validation plus structural warnings.
    pub fn from_batch(batch: &BatchValidation, structural_warnings: Vec<String>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        if batch.total == 0 {
            warnings.push(NO_COMPONENTS_WARNING.to_string());
        }
        warnings.extend(structural_warnings);

        for result in &batch.results {
            if result.valid {
                let group = result.module_group.as_deref().unwrap_or("unknown");
                match (&result.note, &result.canonical) {
                    (Some(_), Some(canonical)) => suggestions.push(format!(
                        "{} is valid as {} (from {})",
                        result.requested, canonical, group
                    )),
                    _ => suggestions.push(format!("{} is valid (from {})", result.requested, group)),
                }
                continue;
            }

            match result.best_suggestion() {
                Some(best) => {
                    errors.push(format!("Invalid component: {}", result.requested));
                    suggestions.push(format!(
                        "Replace {} with {} ({})",
                        result.requested, best.name, best.reason
                    ));
                }
                None => errors.push(format!(
                    "Invalid component: {} (no suggestions available)",
                    result.requested
                )),
            }
        }

        Self {
            is_valid: batch.invalid_count == 0,
            score: score(batch.valid_count, batch.total),
            total: batch.total,
            valid_count: batch.valid_count,
            errors,
            warnings,
            suggestions,
        }
    }

    /// Record applied fix descriptions among the suggestions.
    pub fn with_fixes<'a>(mut self, fixes: impl IntoIterator<Item = &'a str>) -> Self {
        self.suggestions
            .extend(fixes.into_iter().map(|f| format!("Applied fix: {}", f)));
        self
    }

    /// One-line summary.
    pub fn format_summary(&self) -> String {
        format!(
            "{} score {}/100 ({}/{} components valid, {} errors, {} warnings)",
            if self.is_valid { "VALID" } else { "INVALID" },
            self.score,
            self.valid_count,
            self.total,
            self.errors.len(),
            self.warnings.len()
        )
    }

    /// Multi-line report listing every message.
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.format_summary());
        out.push('\n');
        for (title, items) in [
            ("Errors", &self.errors),
            ("Warnings", &self.warnings),
            ("Suggestions", &self.suggestions),
        ] {
            if items.is_empty() {
                continue;
            }
            out.push_str(&format!("{}:\n", title));
            for item in items {
                out.push_str(&format!("  - {}\n", item));
            }
        }
        out
    }
}
