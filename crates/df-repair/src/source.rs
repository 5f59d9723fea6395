//! Line-oriented model of diagram source.
//!
//! Every physical line is kept with its original text and a coarse
//! classification. Rules edit lines through the model; lines nobody touched
//! render back byte-for-byte.

use std::ops::Range;
use std::sync::LazyLock;

use df_core::{parse_import, ImportStatement};
use regex::Regex;

use crate::tokens::{self, LexState, Segment, SegmentKind};

static DIAGRAM_DECL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*with\s+Diagram\s*\(").expect("diagram pattern is valid"));

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\(")
        .expect("declaration pattern is valid")
});

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=[^=]").expect("assignment pattern is valid")
});

/// Operators that chain nodes in a connection statement.
pub const CONNECTION_OPERATORS: [&str; 3] = [">>", "<<", "-"];

/// Coarse classification of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `from a.b import X, Y`
    Import(ImportStatement),
    /// `with Diagram(...)`
    DiagramDecl,
    /// `var = Callee(...)`
    Declaration { variable: String, callee: String },
    /// Top-level `>>` / `<<` chain
    Connection,
    Blank,
    /// Deleted by a rule; renders as nothing
    Removed,
    Other,
}

#[derive(Debug, Clone)]
pub struct SourceLine {
    text: String,
    kind: LineKind,
    segments: Vec<Segment>,
    masked: String,
    verbatim: bool,
}

impl SourceLine {
    fn new(text: String, state: &mut LexState) -> Self {
        let verbatim = *state != LexState::Code;
        let segments = tokens::lex(&text, state);
        let masked = tokens::mask(&text, &segments);
        let kind = classify(&text, &masked, verbatim);
        Self {
            text,
            kind,
            segments,
            masked,
            verbatim,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &LineKind {
        &self.kind
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Text with string bytes replaced by `"` and comments by spaces.
    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// Starts inside a multi-line string; never rewritten.
    pub fn is_verbatim(&self) -> bool {
        self.verbatim
    }

    pub fn is_removed(&self) -> bool {
        self.kind == LineKind::Removed
    }

    /// Contains something other than whitespace and comments.
    pub fn has_code(&self) -> bool {
        !self.is_removed() && (self.verbatim || !self.masked.trim().is_empty())
    }

    /// Whether rules may rewrite this line.
    pub fn is_editable(&self) -> bool {
        !self.verbatim && !self.is_removed()
    }

    pub fn indent(&self) -> &str {
        let trimmed = self.text.trim_start();
        &self.text[..self.text.len() - trimmed.len()]
    }

    /// End of the code part, before any trailing comment.
    pub fn code_end(&self) -> usize {
        self.segments
            .iter()
            .rev()
            .find(|s| s.kind != SegmentKind::Comment)
            .map_or(0, |s| s.range.end)
    }

    /// Variable assigned by this line, if it is a simple assignment.
    pub fn assigned_variable(&self) -> Option<&str> {
        if let LineKind::Declaration { variable, .. } = &self.kind {
            return Some(variable);
        }
        ASSIGNMENT_RE
            .captures(&self.masked)
            .and_then(|c| c.get(1))
            .map(|m| &self.text[m.range()])
    }
}

fn classify(text: &str, masked: &str, verbatim: bool) -> LineKind {
    if verbatim {
        return LineKind::Other;
    }
    if text.trim().is_empty() {
        return LineKind::Blank;
    }
    if let Some(statement) = parse_import(text) {
        return LineKind::Import(statement);
    }
    if DIAGRAM_DECL_RE.is_match(masked) {
        return LineKind::DiagramDecl;
    }
    if let Some(caps) = DECLARATION_RE.captures(masked) {
        if let (Some(variable), Some(callee)) = (caps.get(1), caps.get(2)) {
            return LineKind::Declaration {
                variable: text[variable.range()].to_string(),
                callee: text[callee.range()].to_string(),
            };
        }
    }
    let (_, separators) = tokens::split_top_level(masked, 0..masked.len(), &[">>", "<<"]);
    if !separators.is_empty() {
        return LineKind::Connection;
    }
    LineKind::Other
}

/// Parsed diagram source.
#[derive(Debug, Clone)]
pub struct SourceModel {
    lines: Vec<SourceLine>,
    trailing_newline: bool,
}

impl SourceModel {
    pub fn parse(text: &str) -> Self {
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        let mut state = LexState::Code;
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n')
                .map(|line| SourceLine::new(line.to_string(), &mut state))
                .collect()
        };
        Self {
            lines,
            trailing_newline,
        }
    }

    pub fn render(&self) -> String {
        let mut out = self
            .lines
            .iter()
            .filter(|l| !l.is_removed())
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[SourceLine] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> &SourceLine {
        &self.lines[index]
    }

    /// Replace the text of a line and reclassify the model.
    pub fn set_text(&mut self, index: usize, text: String) {
        if self.lines[index].text == text {
            return;
        }
        self.lines[index].text = text;
        self.relex();
    }

    /// Mark a line removed.
    pub fn remove(&mut self, index: usize) {
        self.lines[index].kind = LineKind::Removed;
    }

    /// Mark a range of lines removed.
    pub fn remove_range(&mut self, range: Range<usize>) {
        for index in range {
            self.remove(index);
        }
    }

    /// Insert a new line before `index`.
    pub fn insert(&mut self, index: usize, text: String) {
        let mut state = LexState::Code;
        self.lines.insert(index, SourceLine::new(text, &mut state));
        self.relex();
    }

    /// Physically drop removed lines.
    pub fn drop_removed(&mut self) {
        self.lines.retain(|l| !l.is_removed());
    }

    pub fn has_removed(&self) -> bool {
        self.lines.iter().any(SourceLine::is_removed)
    }

    /// Import statements on live lines.
    pub fn imports(&self) -> Vec<(usize, &ImportStatement)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| match &l.kind {
                LineKind::Import(statement) => Some((i, statement)),
                _ => None,
            })
            .collect()
    }

    /// Logical statements as line ranges. Bracketed and backslash-continued
    /// lines join the statement that opened them.
    pub fn statements(&self) -> Vec<Range<usize>> {
        let mut statements = Vec::new();
        let mut i = 0;
        while i < self.lines.len() {
            let line = &self.lines[i];
            if !line.has_code() || line.verbatim {
                i += 1;
                continue;
            }
            let start = i;
            let mut depth = 0;
            loop {
                let current = &self.lines[i];
                if !current.is_removed() {
                    depth += tokens::depth_delta(&current.masked);
                }
                let continued = current.masked.trim_end().ends_with('\\')
                    || self.lines.get(i + 1).is_some_and(|next| next.verbatim);
                i += 1;
                if i >= self.lines.len() || (depth <= 0 && !continued) {
                    break;
                }
            }
            statements.push(start..i);
        }
        statements
    }

    /// The statement range containing `index`, or just that line.
    pub fn statement_at(&self, index: usize) -> Range<usize> {
        self.statements()
            .into_iter()
            .find(|r| r.contains(&index))
            .unwrap_or(index..index + 1)
    }

    /// Whether the statement opens an indented block.
    pub fn is_block_header(&self, statement: &Range<usize>) -> bool {
        let last = &self.lines[statement.end - 1];
        last.masked[..last.code_end()].trim_end().ends_with(':')
    }

    /// Live code lines indented under the block opened by `statement`.
    pub fn block_body(&self, statement: &Range<usize>) -> Vec<usize> {
        let header_indent = self.lines[statement.start].indent().len();
        let mut body = Vec::new();
        for index in statement.end..self.lines.len() {
            let line = &self.lines[index];
            if !line.has_code() {
                continue;
            }
            if !line.verbatim && line.indent().len() <= header_indent {
                break;
            }
            body.push(index);
        }
        body
    }

    /// Recompute lexer state, masks and kinds after an edit.
    fn relex(&mut self) {
        let mut state = LexState::Code;
        for line in &mut self.lines {
            if line.is_removed() {
                continue;
            }
            let text = std::mem::take(&mut line.text);
            *line = SourceLine::new(text, &mut state);
        }
    }
}
