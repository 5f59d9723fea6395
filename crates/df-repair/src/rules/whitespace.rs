//! Rule 6: blank lines stranded by removals are dropped.
//!
//! Only blank runs that a removal created are collapsed. Blank lines the
//! author wrote between untouched statements stay as they are.

use super::{RepairContext, RepairRule};
use crate::fixer::FixRecord;
use crate::source::{LineKind, SourceModel};

pub struct WhitespaceRule;

impl WhitespaceRule {
    /// Indices of blank lines to drop.
    fn stranded(model: &SourceModel) -> Vec<usize> {
        let mut stranded = Vec::new();
        let mut after_removal = false;
        // Whether the last kept line is blank, or nothing is kept yet.
        let mut blank_before = true;

        for (index, line) in model.lines().iter().enumerate() {
            match line.kind() {
                LineKind::Removed => after_removal = true,
                LineKind::Blank if after_removal && blank_before => stranded.push(index),
                LineKind::Blank => blank_before = true,
                _ => {
                    after_removal = false;
                    blank_before = false;
                }
            }
        }

        // Trailing blanks left once the last statement was removed.
        if after_removal {
            for index in (0..model.len()).rev() {
                match model.line(index).kind() {
                    LineKind::Removed => {}
                    LineKind::Blank if !stranded.contains(&index) => stranded.push(index),
                    LineKind::Blank => {}
                    _ => break,
                }
            }
        }
        stranded.sort_unstable();
        stranded
    }
}

impl RepairRule for WhitespaceRule {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn matches(&self, model: &SourceModel, _ctx: &RepairContext<'_>) -> bool {
        model.has_removed()
    }

    fn rewrite(&self, model: &mut SourceModel, _ctx: &RepairContext<'_>) -> Vec<FixRecord> {
        let stranded = Self::stranded(model);
        for &index in &stranded {
            model.remove(index);
        }
        model.drop_removed();

        if stranded.is_empty() {
            return Vec::new();
        }
        vec![FixRecord::new(
            self.name(),
            format!("Removed {} blank line(s) left by earlier fixes", stranded.len()),
        )]
    }
}
