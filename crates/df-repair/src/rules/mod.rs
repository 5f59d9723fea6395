//! Repair rules, applied in a fixed order.
//!
//! | # | Rule | Effect |
//! |---|------|--------|
//! | 1 | [`SynonymRule`] | misspellings and aliases become canonical names |
//! | 2 | [`RelocationRule`] | valid names move to their home module group |
//! | 3 | [`ReplacementRule`] | unknown names become their top suggestion |
//! | 4 | [`RemovalRule`] | unknown names without suggestions are deleted |
//! | 5 | [`DiagramOptionsRule`] | `with Diagram(...)` carries exactly one `show=False` |
//! | 6 | [`WhitespaceRule`] | blank lines left behind by removals are dropped |
//!
//! Later rules assume the normalization of earlier ones: rule 2 only sees
//! canonical names because rule 1 ran first.

mod diagram_options;
mod relocation;
mod removal;
mod replacement;
mod synonym;
mod whitespace;

use std::collections::HashSet;

use df_core::{Catalog, CorrectionTable, ImportStatement, ImportedName};

use crate::fixer::FixRecord;
use crate::source::{LineKind, SourceModel};
use crate::tokens;

pub use diagram_options::DiagramOptionsRule;
pub use relocation::RelocationRule;
pub use removal::RemovalRule;
pub use replacement::ReplacementRule;
pub use synonym::SynonymRule;
pub use whitespace::WhitespaceRule;

/// Read-only inputs shared by every rule.
#[derive(Debug, Clone, Copy)]
pub struct RepairContext<'a> {
    pub catalog: &'a Catalog,
    pub corrections: &'a CorrectionTable,
}

/// One independent `(matcher, rewriter)` pair over the source model.
pub trait RepairRule: Send + Sync {
    /// Stable rule name, recorded on every fix it produces.
    fn name(&self) -> &'static str;

    /// Whether the rule has anything to do.
    fn matches(&self, model: &SourceModel, ctx: &RepairContext<'_>) -> bool;

    /// Apply the rule and describe every change made.
    fn rewrite(&self, model: &mut SourceModel, ctx: &RepairContext<'_>) -> Vec<FixRecord>;
}

/// The six rules in application order.
pub fn default_rules() -> Vec<Box<dyn RepairRule>> {
    vec![
        Box::new(SynonymRule),
        Box::new(RelocationRule),
        Box::new(ReplacementRule),
        Box::new(RemovalRule),
        Box::new(DiagramOptionsRule),
        Box::new(WhitespaceRule),
    ]
}

/// Imports from the catalog's namespace: `(line, statement)`.
pub(crate) fn catalog_imports(model: &SourceModel, ctx: &RepairContext<'_>) -> Vec<(usize, ImportStatement)> {
    model
        .imports()
        .into_iter()
        .filter(|(_, s)| s.namespace() == ctx.catalog.namespace())
        .map(|(i, s)| (i, s.clone()))
        .collect()
}

/// Local names bound by imports from anywhere but the catalog namespace.
/// These belong to other libraries and are never rewritten.
pub(crate) fn foreign_names(model: &SourceModel, ctx: &RepairContext<'_>) -> HashSet<String> {
    model
        .imports()
        .into_iter()
        .filter(|(_, s)| s.namespace() != ctx.catalog.namespace())
        .flat_map(|(_, s)| s.names.iter().map(|n| n.local_name().to_string()))
        .collect()
}

/// Whether a line's code may be rewritten by identifier substitution.
pub(crate) fn is_usage_line(kind: &LineKind) -> bool {
    !matches!(kind, LineKind::Import(_) | LineKind::Removed | LineKind::Blank)
}

/// Rename whole-word identifier `from` to `to` on every usage line.
/// Returns the number of lines changed.
pub(crate) fn rename_usages(model: &mut SourceModel, from: &str, to: &str) -> usize {
    let mut changed = 0;
    for index in 0..model.len() {
        let line = model.line(index);
        if !line.is_editable() || !is_usage_line(line.kind()) {
            continue;
        }
        let rewritten = tokens::rewrite_identifiers(line.text(), line.segments(), |ident| {
            (ident == from).then(|| to.to_string())
        });
        if let Some(text) = rewritten {
            model.set_text(index, text);
            changed += 1;
        }
    }
    changed
}

/// Rewrite a fully-qualified dotted reference such as
/// `diagrams.azure.web.KeyVaults` on every usage line.
pub(crate) fn rename_dotted(model: &mut SourceModel, from: &str, to: &str) -> usize {
    let mut changed = 0;
    for index in 0..model.len() {
        let line = model.line(index);
        if !line.is_editable() || !is_usage_line(line.kind()) {
            continue;
        }
        let masked = line.masked().as_bytes();
        let text = line.text();
        let mut out = String::new();
        let mut last = 0;
        let mut from_pos = 0;
        while let Some(pos) = line.masked()[from_pos..].find(from) {
            let start = from_pos + pos;
            let end = start + from.len();
            let left_ok = start == 0 || !(tokens::is_ident_char(masked[start - 1]) || masked[start - 1] == b'.');
            let right_ok = masked.get(end).map_or(true, |&b| !tokens::is_ident_char(b));
            if left_ok && right_ok {
                out.push_str(&text[last..start]);
                out.push_str(to);
                last = end;
            }
            from_pos = end;
        }
        if last > 0 {
            out.push_str(&text[last..]);
            model.set_text(index, out);
            changed += 1;
        }
    }
    changed
}

/// Move one imported name to `target_path`, optionally renaming it.
///
/// A name imported alone has its statement re-pointed in place. A name with
/// siblings leaves them untouched: it joins an existing import of the target
/// module, or gets a new import line right after the original.
pub(crate) fn move_import(
    model: &mut SourceModel,
    line: usize,
    name_index: usize,
    new_name: Option<&str>,
    target_path: &str,
) {
    let LineKind::Import(statement) = model.line(line).kind().clone() else {
        return;
    };
    let mut statement = statement;
    let original = statement.names[name_index].clone();
    let moved = ImportedName {
        name: new_name.unwrap_or(&original.name).to_string(),
        alias: original.alias.clone(),
    };

    if statement.names.len() == 1 {
        statement.module_path = target_path.to_string();
        statement.names[0] = moved;
        model.set_text(line, statement.render());
        return;
    }

    statement.names.remove(name_index);
    let indent = statement.indent.clone();
    model.set_text(line, statement.render());

    let existing = model
        .imports()
        .into_iter()
        .find(|(_, s)| s.module_path == target_path)
        .map(|(i, s)| (i, s.clone()));
    match existing {
        Some((target_line, mut target)) => {
            if !target.names.contains(&moved) {
                target.names.push(moved);
                model.set_text(target_line, target.render());
            }
        }
        None => {
            let statement = ImportStatement {
                indent,
                module_path: target_path.to_string(),
                names: vec![moved],
                comment: None,
                parenthesized: false,
            };
            model.insert(line + 1, statement.render());
        }
    }
}
