//! Rule 5: the diagram declaration carries exactly one `show=False`.
//!
//! Also drops repeated keyword arguments (first wins) and the output
//! location arguments, since the renderer decides where artifacts go. The
//! title and every other argument keep their text. A rewritten declaration
//! is collapsed onto one line and loses comments inside the call.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use super::{RepairContext, RepairRule};
use crate::fixer::FixRecord;
use crate::source::{LineKind, SourceModel};
use crate::tokens::{self, LexState, Segment, SegmentKind};

static DIAGRAM_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"with\s+Diagram\s*\(").expect("diagram call pattern is valid"));

/// Keyword arguments owned by the renderer.
const RENDERER_OWNED: [&str; 2] = ["filename", "outdir"];

const SHOW_FALSE: &str = "show=False";

pub struct DiagramOptionsRule;

struct Plan {
    statement: Range<usize>,
    text: String,
    fixes: Vec<String>,
}

/// Keyword name of an argument such as `show = False`.
fn keyword_of(masked_arg: &str) -> Option<&str> {
    let bytes = masked_arg.as_bytes();
    if !bytes.first().is_some_and(|&b| tokens::is_ident_start(b)) {
        return None;
    }
    // The name is ASCII, so `end` is a char boundary.
    let end = bytes.iter().position(|&b| !tokens::is_ident_char(b)).unwrap_or(bytes.len());
    let rest = bytes[end..].trim_ascii_start();
    (rest.starts_with(b"=") && !rest.starts_with(b"==")).then(|| &masked_arg[..end])
}

/// Argument text on one line. Whitespace runs outside strings that span a
/// line break become a single space.
fn flatten(code: &str, segments: &[Segment], range: Range<usize>) -> String {
    let base = range.start;
    let text = &code[range];
    let in_string = |pos: usize| {
        segments
            .iter()
            .any(|s| s.kind == SegmentKind::Str && s.range.contains(&pos))
    };
    let mut out = String::with_capacity(text.len());
    let mut run: Option<usize> = None;
    for (offset, c) in text.char_indices() {
        if c.is_whitespace() && !in_string(base + offset) {
            run.get_or_insert(offset);
            continue;
        }
        if let Some(start) = run.take() {
            let gap = &text[start..offset];
            out.push_str(if gap.contains('\n') { " " } else { gap });
        }
        out.push(c);
    }
    out
}

impl DiagramOptionsRule {
    fn plan(model: &SourceModel) -> Option<Plan> {
        let index = (0..model.len()).find(|&i| {
            let line = model.line(i);
            line.is_editable() && *line.kind() == LineKind::DiagramDecl
        })?;
        let statement = model.statement_at(index);
        let joined = statement
            .clone()
            .map(|i| model.line(i).text())
            .collect::<Vec<_>>()
            .join("\n");
        let mut state = LexState::Code;
        let segments = tokens::lex(&joined, &mut state);
        let masked = tokens::mask(&joined, &segments);
        let code = tokens::blank_comments(&joined, &segments);

        let open = DIAGRAM_CALL_RE.find(&masked)?.end() - 1;
        let close = matching_paren(&masked, open)?;

        let (ranges, _) = tokens::split_top_level(&masked, open + 1..close, &[","]);
        let args: Vec<Range<usize>> = ranges
            .into_iter()
            .map(|r| tokens::trim_range(&masked, r))
            .filter(|r| !r.is_empty())
            .collect();

        let mut kept: Vec<String> = Vec::with_capacity(args.len() + 1);
        let mut seen: Vec<&str> = Vec::new();
        let mut fixes = Vec::new();
        let mut positional = 0;
        let mut show_seen = false;

        for arg in &args {
            let arg_masked = &masked[arg.clone()];
            let arg_text = flatten(&code, &segments, arg.clone());
            let Some(keyword) = keyword_of(arg_masked) else {
                if kept.len() == positional && !arg_text.starts_with("**") {
                    positional += 1;
                }
                kept.push(arg_text);
                continue;
            };

            if keyword == "show" {
                if show_seen {
                    fixes.push("Removed duplicate show option from diagram declaration".to_string());
                    continue;
                }
                show_seen = true;
                let value = arg_masked.split_once('=').map_or("", |(_, v)| v.trim());
                if value == "False" {
                    kept.push(arg_text);
                } else {
                    fixes.push("Set show=False in diagram declaration".to_string());
                    kept.push(SHOW_FALSE.to_string());
                }
            } else if RENDERER_OWNED.contains(&keyword) {
                fixes.push(format!("Removed '{}' argument from diagram declaration", keyword));
            } else if seen.contains(&keyword) {
                fixes.push(format!("Removed duplicate '{}' argument from diagram declaration", keyword));
            } else {
                seen.push(keyword);
                kept.push(arg_text);
            }
        }

        if !show_seen {
            kept.insert(positional, SHOW_FALSE.to_string());
            fixes.push("Added show=False to diagram declaration".to_string());
        }
        if fixes.is_empty() {
            return None;
        }

        let text = format!("{}{}{}", &joined[..=open], kept.join(", "), &joined[close..]);
        Some(Plan {
            statement,
            text,
            fixes,
        })
    }
}

/// Offset of the `)` closing the `(` at `open`.
fn matching_paren(masked: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (offset, b) in masked.as_bytes()[open..].iter().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

impl RepairRule for DiagramOptionsRule {
    fn name(&self) -> &'static str {
        "diagram-options"
    }

    fn matches(&self, model: &SourceModel, _ctx: &RepairContext<'_>) -> bool {
        Self::plan(model).is_some()
    }

    fn rewrite(&self, model: &mut SourceModel, _ctx: &RepairContext<'_>) -> Vec<FixRecord> {
        let Some(plan) = Self::plan(model) else {
            return Vec::new();
        };
        model.set_text(plan.statement.start, plan.text);
        model.remove_range(plan.statement.start + 1..plan.statement.end);
        plan.fixes
            .into_iter()
            .map(|description| FixRecord::new(self.name(), description))
            .collect()
    }
}
