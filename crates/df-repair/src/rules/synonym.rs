//! Rule 1: known misspellings become canonical names.

use std::collections::HashSet;

use df_core::{ImportStatement, ImportedName};

use super::{catalog_imports, foreign_names, is_usage_line, RepairContext, RepairRule};
use crate::fixer::FixRecord;
use crate::source::SourceModel;
use crate::tokens;

pub struct SynonymRule;

impl SynonymRule {
    fn correct<'a>(ctx: &RepairContext<'a>, foreign: &HashSet<String>, ident: &str) -> Option<&'a str> {
        if foreign.contains(ident) {
            return None;
        }
        ctx.corrections.get(ident)
    }

    fn corrected_import(
        ctx: &RepairContext<'_>,
        foreign: &HashSet<String>,
        statement: &ImportStatement,
        corrections: &mut Vec<(String, String)>,
    ) -> ImportStatement {
        let mut record = |from: &str, to: &str| {
            let pair = (from.to_string(), to.to_string());
            if !corrections.contains(&pair) {
                corrections.push(pair);
            }
        };

        let mut names: Vec<ImportedName> = Vec::with_capacity(statement.names.len());
        for imported in &statement.names {
            let name = match Self::correct(ctx, foreign, &imported.name) {
                Some(canonical) => {
                    record(&imported.name, canonical);
                    canonical.to_string()
                }
                None => imported.name.clone(),
            };
            let alias = imported.alias.as_ref().map(|alias| match Self::correct(ctx, foreign, alias) {
                Some(canonical) => {
                    record(alias, canonical);
                    canonical.to_string()
                }
                None => alias.clone(),
            });
            // `X as X` is just `X`.
            let alias = alias.filter(|a| a != &name);
            let corrected = ImportedName { name, alias };
            if !names.contains(&corrected) {
                names.push(corrected);
            }
        }

        ImportStatement {
            names,
            ..statement.clone()
        }
    }
}

impl RepairRule for SynonymRule {
    fn name(&self) -> &'static str {
        "synonym"
    }

    fn matches(&self, model: &SourceModel, ctx: &RepairContext<'_>) -> bool {
        let foreign = foreign_names(model, ctx);
        let imports_need_fix = catalog_imports(model, ctx).iter().any(|(_, statement)| {
            let mut scratch = Vec::new();
            Self::corrected_import(ctx, &foreign, statement, &mut scratch) != *statement
        });
        imports_need_fix
            || model.lines().iter().any(|line| {
                line.is_editable()
                    && is_usage_line(line.kind())
                    && tokens::identifiers(line.text(), line.segments())
                        .into_iter()
                        .any(|r| Self::correct(ctx, &foreign, &line.text()[r]).is_some())
            })
    }

    fn rewrite(&self, model: &mut SourceModel, ctx: &RepairContext<'_>) -> Vec<FixRecord> {
        let foreign = foreign_names(model, ctx);
        let mut corrections: Vec<(String, String)> = Vec::new();

        for (index, statement) in catalog_imports(model, ctx) {
            let corrected = Self::corrected_import(ctx, &foreign, &statement, &mut corrections);
            if corrected != statement {
                model.set_text(index, corrected.render());
            }
        }

        for index in 0..model.len() {
            let line = model.line(index);
            if !line.is_editable() || !is_usage_line(line.kind()) {
                continue;
            }
            let rewritten = tokens::rewrite_identifiers(line.text(), line.segments(), |ident| {
                let canonical = Self::correct(ctx, &foreign, ident)?;
                let pair = (ident.to_string(), canonical.to_string());
                if !corrections.contains(&pair) {
                    corrections.push(pair);
                }
                Some(canonical.to_string())
            });
            if let Some(text) = rewritten {
                model.set_text(index, text);
            }
        }

        corrections
            .into_iter()
            .map(|(from, to)| FixRecord::new(self.name(), format!("Corrected '{}' to '{}'", from, to)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use df_core::Catalog;

    use super::*;

    fn run(source: &str) -> (String, Vec<FixRecord>) {
        let catalog = Catalog::builtin().unwrap();
        let corrections = catalog.correction_table();
        let ctx = RepairContext {
            catalog: &catalog,
            corrections: &corrections,
        };
        let mut model = SourceModel::parse(source);
        let fixes = if SynonymRule.matches(&model, &ctx) {
            SynonymRule.rewrite(&mut model, &ctx)
        } else {
            Vec::new()
        };
        (model.render(), fixes)
    }

    #[test]
    fn test_singular_to_plural() {
        let (text, fixes) = run("from diagrams.azure.security import KeyVault\nkv = KeyVault(\"KeyVault\")\n");
        assert_eq!(
            text,
            "from diagrams.azure.security import KeyVaults\nkv = KeyVaults(\"KeyVault\")\n"
        );
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].description, "Corrected 'KeyVault' to 'KeyVaults'");
        assert_eq!(fixes[0].rule, "synonym");
    }

    #[test]
    fn test_alias_and_dedupe_in_import() {
        let (text, _) = run("from diagrams.azure.web import AppService, AppServices, WebApp as WebApps\n");
        assert_eq!(text, "from diagrams.azure.web import AppServices\n");
    }

    #[test]
    fn test_foreign_imports_untouched() {
        let source = "from diagrams.onprem.inmemory import Redis\nfrom diagrams.onprem.client import User\ncache = Redis(\"r\")\n";
        let (text, fixes) = run(source);
        assert_eq!(text, source);
        assert!(fixes.is_empty());
    }

    #[test]
    fn test_no_match_on_canonical_source() {
        let catalog = Catalog::builtin().unwrap();
        let corrections = catalog.correction_table();
        let ctx = RepairContext {
            catalog: &catalog,
            corrections: &corrections,
        };
        let model = SourceModel::parse("from diagrams.azure.web import AppServices\nweb = AppServices(\"w\")\n");
        assert!(!SynonymRule.matches(&model, &ctx));
    }
}
