//! Reference extraction from generated diagram source.
//!
//! Best-effort pattern matching over `from <namespace>.<group> import ...`
//! statements. Nothing here fails: malformed text yields fewer references.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<indent>\s*)from\s+(?P<path>[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s+import\s+(?P<names>[^#]*?)\s*(?P<comment>#.*)?$",
    )
    .expect("import pattern is valid")
});

/// First line of a parenthesized import whose list continues below.
static OPEN_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+[A-Za-z_][A-Za-z0-9_.]*\s+import\s*\([^)]*$").expect("open import pattern is valid")
});

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

static DIAGRAM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*from\s+diagrams\s+import\s+[^#\n]*\bDiagram\b")
        .expect("diagram import pattern is valid")
});

static WITH_DIAGRAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*with\s+Diagram\s*\(").expect("with pattern is valid"));

static SHOW_FALSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bshow\s*=\s*False\b").expect("show pattern is valid"));

/// One name imported by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    /// Name used to refer to the import in the rest of the file.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Render as it appears in an import list. `X as X` collapses to `X`.
    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) if alias != &self.name => format!("{} as {}", self.name, alias),
            _ => self.name.clone(),
        }
    }
}

/// A parsed single-line `from a.b import X, Y as Z` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    pub indent: String,
    /// Full dotted module path, e.g. `diagrams.azure.web`
    pub module_path: String,
    pub names: Vec<ImportedName>,
    pub comment: Option<String>,
    pub parenthesized: bool,
}

impl ImportStatement {
    /// Module path without its last segment.
    pub fn namespace(&self) -> &str {
        self.module_path
            .rsplit_once('.')
            .map_or("", |(namespace, _)| namespace)
    }

    /// Last segment of the module path.
    pub fn module_group(&self) -> &str {
        self.module_path
            .rsplit_once('.')
            .map_or(self.module_path.as_str(), |(_, group)| group)
    }

    /// Render back to a single source line.
    pub fn render(&self) -> String {
        let names: Vec<String> = self.names.iter().map(ImportedName::render).collect();
        let list = if self.parenthesized {
            format!("({})", names.join(", "))
        } else {
            names.join(", ")
        };
        match &self.comment {
            Some(comment) => format!("{}from {} import {}  {}", self.indent, self.module_path, list, comment),
            None => format!("{}from {} import {}", self.indent, self.module_path, list),
        }
    }
}

/// Parse one line as a `from ... import ...` statement.
///
/// Returns `None` for anything else, including the first line of a
/// multi-line parenthesized import. [`extract_references`] folds those
/// before parsing, so their names are still validated. The repair rules
/// work line by line and leave multi-line imports as written.
pub fn parse_import(line: &str) -> Option<ImportStatement> {
    let caps = IMPORT_RE.captures(line)?;
    let mut names_text = caps.name("names")?.as_str().trim();

    let parenthesized = names_text.starts_with('(');
    if parenthesized {
        names_text = names_text.strip_prefix('(')?.strip_suffix(')')?;
    } else if names_text.contains('(') || names_text.contains(')') {
        return None;
    }

    let mut names = Vec::new();
    for part in names_text.split(',') {
        let words: Vec<&str> = part.split_whitespace().collect();
        let imported = match words.as_slice() {
            [name] => ImportedName {
                name: name.to_string(),
                alias: None,
            },
            [name, "as", alias] if IDENT_RE.is_match(alias) => ImportedName {
                name: name.to_string(),
                alias: Some(alias.to_string()),
            },
            _ => continue,
        };
        if IDENT_RE.is_match(&imported.name) {
            names.push(imported);
        }
    }
    if names.is_empty() {
        return None;
    }

    Some(ImportStatement {
        indent: caps.name("indent").map_or("", |m| m.as_str()).to_string(),
        module_path: caps.name("path")?.as_str().to_string(),
        names,
        comment: caps.name("comment").map(|m| m.as_str().to_string()),
        parenthesized,
    })
}

/// A component name referenced by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Imported component name, with any `as` alias stripped
    pub name: String,
    /// Module group it was imported from
    pub module_group: String,
    /// Namespace the module group lives under
    pub namespace: String,
    /// Local alias, if imported with `as`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// 1-based line of the first import
    pub line: usize,
}

/// Extract component references, deduplicated by name (first wins).
pub fn extract_references(source: &str) -> Vec<Reference> {
    let mut seen = HashSet::new();
    let mut references = Vec::new();

    for (index, line) in fold_imports(source) {
        let Some(statement) = parse_import(&line) else {
            continue;
        };
        // `from diagrams import Diagram` names no component.
        if statement.namespace().is_empty() {
            continue;
        }
        for imported in &statement.names {
            if !seen.insert(imported.name.clone()) {
                continue;
            }
            references.push(Reference {
                name: imported.name.clone(),
                module_group: statement.module_group().to_string(),
                namespace: statement.namespace().to_string(),
                alias: imported.alias.clone(),
                line: index + 1,
            });
        }
    }

    references
}

/// Lines of `source` with 0-based indexes. A multi-line parenthesized
/// import is folded onto its first line and its comments are dropped.
fn fold_imports(source: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut open: Option<(usize, String)> = None;

    for (index, line) in source.lines().enumerate() {
        let code = line.split_once('#').map_or(line, |(code, _)| code);
        if let Some((start, mut folded)) = open.take() {
            folded.push(' ');
            folded.push_str(code.trim());
            if code.contains(')') {
                lines.push((start, folded));
            } else {
                open = Some((start, folded));
            }
            continue;
        }
        if OPEN_IMPORT_RE.is_match(code) {
            open = Some((index, code.trim_end().to_string()));
        } else {
            lines.push((index, line.to_string()));
        }
    }
    // Unterminated: kept so the line count matches, parses to nothing.
    lines.extend(open);
    lines
}

/// Keep only references imported from the given namespace.
pub fn references_in_namespace(references: &[Reference], namespace: &str) -> Vec<Reference> {
    references
        .iter()
        .filter(|r| r.namespace == namespace)
        .cloned()
        .collect()
}

/// Structural problems that stop a diagram source from rendering.
pub fn structural_warnings(source: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    if !DIAGRAM_IMPORT_RE.is_match(source) {
        warnings.push("Missing 'from diagrams import Diagram'".to_string());
    }
    if !WITH_DIAGRAM_RE.is_match(source) {
        warnings.push("Missing 'with Diagram' statement".to_string());
    }
    if !SHOW_FALSE_RE.is_match(source) {
        warnings.push("Missing 'show=False' option".to_string());
    }
    warnings
}
