//! Rule 2: valid components imported from the wrong module group move to
//! their home group.

use df_core::Validator;

use super::{catalog_imports, move_import, rename_dotted, RepairContext, RepairRule};
use crate::fixer::FixRecord;
use crate::source::SourceModel;

pub struct RelocationRule;

struct Misplaced {
    line: usize,
    name_index: usize,
    name: String,
    from_group: String,
    to_group: String,
}

impl RelocationRule {
    fn next_misplaced(model: &SourceModel, ctx: &RepairContext<'_>) -> Option<Misplaced> {
        let validator = Validator::new(ctx.catalog);
        for (line, statement) in catalog_imports(model, ctx) {
            for (name_index, imported) in statement.names.iter().enumerate() {
                let result = validator.validate(&imported.name);
                let Some(home) = result.module_group.filter(|_| result.valid) else {
                    continue;
                };
                if home != statement.module_group() {
                    return Some(Misplaced {
                        line,
                        name_index,
                        name: imported.name.clone(),
                        from_group: statement.module_group().to_string(),
                        to_group: home,
                    });
                }
            }
        }
        None
    }
}

impl RepairRule for RelocationRule {
    fn name(&self) -> &'static str {
        "relocation"
    }

    fn matches(&self, model: &SourceModel, ctx: &RepairContext<'_>) -> bool {
        Self::next_misplaced(model, ctx).is_some()
    }

    fn rewrite(&self, model: &mut SourceModel, ctx: &RepairContext<'_>) -> Vec<FixRecord> {
        let namespace = ctx.catalog.namespace();
        let mut fixes = Vec::new();
        // Each move settles one name for good, so this terminates; the bound
        // only guards against a catalog that disagrees with itself.
        let budget = model.imports().iter().map(|(_, s)| s.names.len()).sum::<usize>();

        for _ in 0..budget {
            let Some(misplaced) = Self::next_misplaced(model, ctx) else {
                break;
            };
            let target = format!("{}.{}", namespace, misplaced.to_group);
            move_import(model, misplaced.line, misplaced.name_index, None, &target);
            rename_dotted(
                model,
                &format!("{}.{}.{}", namespace, misplaced.from_group, misplaced.name),
                &format!("{}.{}", target, misplaced.name),
            );

            tracing::debug!(
                component = %misplaced.name,
                from = %misplaced.from_group,
                to = %misplaced.to_group,
                "relocated import"
            );
            fixes.push(FixRecord::new(
                self.name(),
                format!(
                    "Moved '{}' from module '{}' to '{}'",
                    misplaced.name, misplaced.from_group, misplaced.to_group
                ),
            ));
        }

        fixes
    }
}
