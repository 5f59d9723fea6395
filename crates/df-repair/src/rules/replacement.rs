//! Rule 3: unknown components with a suggestion become the top suggestion.

use df_core::{Suggestion, Validator};

use super::{catalog_imports, foreign_names, move_import, rename_dotted, rename_usages, RepairContext, RepairRule};
use crate::fixer::FixRecord;
use crate::source::SourceModel;

pub struct ReplacementRule;

struct Unknown {
    line: usize,
    name_index: usize,
    name: String,
    from_group: String,
    suggestion: Suggestion,
}

impl ReplacementRule {
    fn next_unknown(model: &SourceModel, ctx: &RepairContext<'_>) -> Option<Unknown> {
        let validator = Validator::new(ctx.catalog);
        for (line, statement) in catalog_imports(model, ctx) {
            for (name_index, imported) in statement.names.iter().enumerate() {
                let mut result = validator.validate(&imported.name);
                if result.valid || result.suggestions.is_empty() {
                    continue;
                }
                return Some(Unknown {
                    line,
                    name_index,
                    name: imported.name.clone(),
                    from_group: statement.module_group().to_string(),
                    suggestion: result.suggestions.swap_remove(0),
                });
            }
        }
        None
    }
}

impl RepairRule for ReplacementRule {
    fn name(&self) -> &'static str {
        "replacement"
    }

    fn matches(&self, model: &SourceModel, ctx: &RepairContext<'_>) -> bool {
        Self::next_unknown(model, ctx).is_some()
    }

    fn rewrite(&self, model: &mut SourceModel, ctx: &RepairContext<'_>) -> Vec<FixRecord> {
        let namespace = ctx.catalog.namespace();
        let foreign = foreign_names(model, ctx);
        let mut fixes = Vec::new();
        let budget = model.imports().iter().map(|(_, s)| s.names.len()).sum::<usize>();

        for _ in 0..budget {
            let Some(unknown) = Self::next_unknown(model, ctx) else {
                break;
            };
            let replacement = &unknown.suggestion.name;
            let target = format!("{}.{}", namespace, unknown.suggestion.module_group);

            move_import(model, unknown.line, unknown.name_index, Some(replacement.as_str()), &target);
            rename_dotted(
                model,
                &format!("{}.{}.{}", namespace, unknown.from_group, unknown.name),
                &format!("{}.{}", target, replacement),
            );
            if !foreign.contains(&unknown.name) {
                rename_usages(model, &unknown.name, replacement);
            }

            tracing::debug!(
                component = %unknown.name,
                replacement = %replacement,
                "replaced unknown component"
            );
            fixes.push(FixRecord::new(
                self.name(),
                format!(
                    "Replaced unknown '{}' with '{}' ({})",
                    unknown.name, replacement, unknown.suggestion.reason
                ),
            ));
        }

        fixes
    }
}
