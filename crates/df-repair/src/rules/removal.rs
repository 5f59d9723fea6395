//! Rule 4: unknown components with no suggestion are deleted.
//!
//! The import goes first, then every statement that instantiates the
//! component, then every statement that uses a variable bound to it.
//! Connection chains lose only the affected operands. A block emptied by the
//! removal is filled with `pass` for the diagram itself and dropped otherwise.

use std::collections::HashSet;
use std::ops::Range;

use df_core::Validator;

use super::{catalog_imports, RepairContext, RepairRule};
use crate::fixer::FixRecord;
use crate::source::{LineKind, SourceModel, CONNECTION_OPERATORS};
use crate::tokens;

pub struct RemovalRule;

/// What counts as a reference to the removed component.
struct Doomed {
    callee: String,
    variables: HashSet<String>,
}

impl Doomed {
    fn hit(&self, masked: &str) -> bool {
        tokens::calls(masked, &self.callee) || self.variables.iter().any(|v| tokens::mentions(masked, v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandKind {
    Node,
    Group,
    Edge,
}

struct Operand {
    operator: Option<&'static str>,
    kind: OperandKind,
    text: String,
}

impl RemovalRule {
    fn next_unremovable(model: &SourceModel, ctx: &RepairContext<'_>) -> Option<(usize, usize, String, String)> {
        let validator = Validator::new(ctx.catalog);
        for (line, statement) in catalog_imports(model, ctx) {
            for (name_index, imported) in statement.names.iter().enumerate() {
                let result = validator.validate(&imported.name);
                if !result.valid && result.suggestions.is_empty() {
                    return Some((line, name_index, imported.name.clone(), imported.local_name().to_string()));
                }
            }
        }
        None
    }

    fn drop_import(model: &mut SourceModel, line: usize, name_index: usize) {
        let LineKind::Import(mut statement) = model.line(line).kind().clone() else {
            return;
        };
        statement.names.remove(name_index);
        if statement.names.is_empty() {
            model.remove(line);
        } else {
            model.set_text(line, statement.render());
        }
    }

    /// Remove every statement touching the component. Returns whether any
    /// line changed.
    fn purge(model: &mut SourceModel, local_name: &str) -> bool {
        let mut doomed = Doomed {
            callee: local_name.to_string(),
            variables: HashSet::new(),
        };
        let mut changed_any = false;

        // New doomed variables can make earlier statements stale, so sweep
        // until a pass changes nothing. Every sweep settles one statement.
        for _ in 0..=model.len() * 2 {
            let mut changed = false;
            for statement in model.statements() {
                if model.line(statement.start).is_removed() {
                    continue;
                }
                if Self::purge_statement(model, &statement, &mut doomed) {
                    changed = true;
                    // Statement ranges shift after an edit.
                    break;
                }
            }
            if !changed {
                break;
            }
            changed_any = true;
        }
        changed_any
    }

    fn purge_statement(model: &mut SourceModel, statement: &Range<usize>, doomed: &mut Doomed) -> bool {
        let first = model.line(statement.start);
        if !first.is_editable() {
            return false;
        }
        match first.kind() {
            LineKind::Import(_) | LineKind::DiagramDecl => return false,
            _ if model.is_block_header(statement) => return false,
            _ => {}
        }

        let masked: String = statement.clone().map(|i| model.line(i).masked()).collect::<Vec<_>>().join("\n");
        if !doomed.hit(&masked) {
            return false;
        }

        if statement.len() == 1 && *first.kind() == LineKind::Connection {
            let rewritten = Self::rewrite_chain(model, statement.start, doomed);
            match rewritten {
                Some(text) => model.set_text(statement.start, text),
                None => model.remove(statement.start),
            }
            return true;
        }

        if let Some(variable) = first.assigned_variable() {
            doomed.variables.insert(variable.to_string());
        }
        model.remove_range(statement.clone());
        true
    }

    /// Rebuild a connection chain without the doomed operands. `None` when
    /// fewer than two nodes survive.
    fn rewrite_chain(model: &SourceModel, index: usize, doomed: &Doomed) -> Option<String> {
        let line = model.line(index);
        let text = line.text();
        let masked = line.masked();
        let indent = line.indent();
        let code_end = line.code_end();

        let (ranges, operators) = tokens::split_top_level(masked, indent.len()..code_end, &CONNECTION_OPERATORS);
        let mut operands = Vec::with_capacity(ranges.len());
        for (position, range) in ranges.into_iter().enumerate() {
            let range = tokens::trim_range(text, range);
            let operand_masked = &masked[range.clone()];
            let operand_text = &text[range.clone()];
            let operator = position.checked_sub(1).map(|p| operators[p]);

            let kind = if operand_text.starts_with('[') {
                OperandKind::Group
            } else if operand_text.starts_with("Edge") && tokens::calls(operand_masked, "Edge") {
                OperandKind::Edge
            } else {
                OperandKind::Node
            };

            let rendered = match kind {
                OperandKind::Group => Self::filter_group(operand_text, operand_masked, doomed),
                _ if doomed.hit(operand_masked) => None,
                _ => Some(operand_text.to_string()),
            };
            match rendered {
                Some(text) => operands.push(Operand { operator, kind, text }),
                // A dropped node takes its incoming operator and edge with it.
                None if kind != OperandKind::Edge => {
                    if operands.last().is_some_and(|o| o.kind == OperandKind::Edge) {
                        operands.pop();
                    }
                }
                None => {}
            }
        }

        while operands.first().is_some_and(|o| o.kind == OperandKind::Edge) {
            operands.remove(0);
        }
        while operands.last().is_some_and(|o| o.kind == OperandKind::Edge) {
            operands.pop();
        }
        operands.dedup_by(|next, prev| prev.kind == OperandKind::Edge && next.kind == OperandKind::Edge);

        let nodes = operands.iter().filter(|o| o.kind != OperandKind::Edge).count();
        if nodes < 2 {
            return None;
        }

        let mut out = indent.to_string();
        for (position, operand) in operands.iter().enumerate() {
            if position > 0 {
                out.push(' ');
                out.push_str(operand.operator.unwrap_or(">>"));
                out.push(' ');
            }
            out.push_str(&operand.text);
        }
        out.push_str(&text[code_end..]);
        Some(out)
    }

    /// Drop doomed members from `[a, b, c]`. `None` if nothing is left.
    fn filter_group(text: &str, masked: &str, doomed: &Doomed) -> Option<String> {
        if !doomed.hit(masked) {
            return Some(text.to_string());
        }
        if !text.ends_with(']') || text.len() < 2 {
            return None;
        }
        let (members, _) = tokens::split_top_level(masked, 1..masked.len() - 1, &[","]);
        let kept: Vec<&str> = members
            .into_iter()
            .map(|r| tokens::trim_range(text, r))
            .filter(|r| !r.is_empty() && !doomed.hit(&masked[r.clone()]))
            .map(|r| &text[r])
            .collect();
        if kept.is_empty() {
            return None;
        }
        Some(format!("[{}]", kept.join(", ")))
    }

    /// Fill or drop blocks left without a body. Returns whether anything
    /// changed.
    fn settle_empty_blocks(model: &mut SourceModel) -> bool {
        let mut changed_any = false;
        loop {
            let empty = model
                .statements()
                .into_iter()
                .find(|s| model.is_block_header(s) && model.block_body(s).is_empty());
            let Some(statement) = empty else {
                break;
            };
            changed_any = true;

            if *model.line(statement.start).kind() == LineKind::DiagramDecl {
                let indent = (statement.end..model.len())
                    .map(|i| model.line(i))
                    .find(|l| l.is_removed() && !l.indent().is_empty())
                    .map(|l| l.indent().to_string())
                    .unwrap_or_else(|| format!("{}    ", model.line(statement.start).indent()));
                model.insert(statement.end, format!("{}pass", indent));
            } else {
                model.remove_range(statement);
            }
        }
        changed_any
    }
}

impl RepairRule for RemovalRule {
    fn name(&self) -> &'static str {
        "removal"
    }

    fn matches(&self, model: &SourceModel, ctx: &RepairContext<'_>) -> bool {
        Self::next_unremovable(model, ctx).is_some()
    }

    fn rewrite(&self, model: &mut SourceModel, ctx: &RepairContext<'_>) -> Vec<FixRecord> {
        let mut fixes = Vec::new();
        let budget = model.imports().iter().map(|(_, s)| s.names.len()).sum::<usize>();

        for _ in 0..budget {
            let Some((line, name_index, name, local_name)) = Self::next_unremovable(model, ctx) else {
                break;
            };
            Self::drop_import(model, line, name_index);
            let purged = Self::purge(model, &local_name);

            tracing::debug!(component = %name, purged, "removed unknown component");
            fixes.push(FixRecord::new(
                self.name(),
                format!("Removed unknown component '{}' (no known replacement)", name),
            ));
        }

        if !fixes.is_empty() && Self::settle_empty_blocks(model) {
            fixes.push(FixRecord::new(
                self.name(),
                "Settled blocks left empty by removals".to_string(),
            ));
        }
        fixes
    }
}

#[cfg(test)]
mod tests {
    use df_core::Catalog;

    use super::*;

    fn run(source: &str) -> String {
        let catalog = Catalog::builtin().unwrap();
        let corrections = catalog.correction_table();
        let ctx = RepairContext {
            catalog: &catalog,
            corrections: &corrections,
        };
        let mut model = SourceModel::parse(source);
        RemovalRule.rewrite(&mut model, &ctx);
        model.render()
    }

    #[test]
    fn test_remove_import_declaration_and_edges() {
        let source = r#"from diagrams import Diagram
from diagrams.azure.web import AppServices
from diagrams.azure.integration import Kafka, ServiceBus

with Diagram("Kafka pipeline", show=False):
    web = AppServices("web")
    stream = Kafka(
        "Kafka"
    )
    bus = ServiceBus("bus")
    web >> stream >> bus
    stream >> web
    web >> Edge(label="x") >> stream
"#;
        let expected = r#"from diagrams import Diagram
from diagrams.azure.web import AppServices
from diagrams.azure.integration import ServiceBus

with Diagram("Kafka pipeline", show=False):
    web = AppServices("web")
    bus = ServiceBus("bus")
    web >> bus
"#;
        assert_eq!(run(source), expected);
    }

    #[test]
    fn test_remove_from_groups_and_inline_calls() {
        let source = r#"from diagrams.azure.integration import Kafka
from diagrams.azure.web import AppServices
with Diagram("x", show=False):
    a = AppServices("a")
    b = AppServices("b")
    a >> [b, Kafka("k")] >> Edge(color="red") >> Kafka("k2") >> b
    Kafka("alone")
"#;
        let expected = r#"from diagrams.azure.web import AppServices
with Diagram("x", show=False):
    a = AppServices("a")
    b = AppServices("b")
    a >> [b] >> b
"#;
        assert_eq!(run(source), expected);
    }

    #[test]
    fn test_empty_blocks() {
        let source = r#"from diagrams.azure.integration import Kafka
with Diagram("x", show=False):
    with Cluster("Streaming"):
        k = Kafka("k")
"#;
        let expected = r#"with Diagram("x", show=False):
    pass
"#;
        assert_eq!(run(source), expected);
    }

    #[test]
    fn test_variables_cascade() {
        let source = r#"from diagrams.azure.integration import Kafka
from diagrams.azure.web import AppServices
with Diagram("x", show=False):
    k = Kafka("k")
    web = AppServices("web")
    streams = [k]
    web >> streams
"#;
        let expected = r#"from diagrams.azure.web import AppServices
with Diagram("x", show=False):
    web = AppServices("web")
"#;
        assert_eq!(run(source), expected);
    }
}
