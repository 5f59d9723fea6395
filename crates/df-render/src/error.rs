//! Render and store errors.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static CANNOT_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cannot import name '([^']+)'").expect("import error pattern is valid"));

static NAME_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NameError: name '([^']+)' is not defined").expect("name error pattern is valid"));

static NO_ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AttributeError: module '[^']+' has no attribute '([^']+)'").expect("attribute error pattern is valid")
});

static NO_MODULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No module named '([^']+)'").expect("module error pattern is valid"));

/// Package the renderer itself depends on. A missing submodule of it is a
/// bad reference in the source; a missing package is a broken environment.
const RENDERER_PACKAGE: &str = "diagrams";

/// Renderer failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The source names a component or module that does not exist
    #[error("Unresolved reference '{name}': {detail}")]
    UnresolvedReference { name: String, detail: String },

    #[error("Syntax error: {0}")]
    Syntax(String),

    /// The renderer's own runtime is missing something
    #[error("Renderer environment is missing module '{module}'")]
    MissingModule { module: String },

    #[error("Renderer crashed: {0}")]
    Crashed(String),

    #[error("Renderer exited successfully but produced no image")]
    NoArtifact,

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to start renderer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact id '{0}'")]
    InvalidArtifactId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Whether the failure points at the source text rather than the renderer.
    pub fn is_bad_reference(&self) -> bool {
        matches!(self, RenderError::UnresolvedReference { .. })
    }

    /// Whether retrying with different source text could help.
    pub fn is_source_problem(&self) -> bool {
        matches!(
            self,
            RenderError::UnresolvedReference { .. } | RenderError::Syntax(_) | RenderError::NoArtifact
        )
    }
}

/// Classify a failed render from the interpreter's stderr.
pub fn classify_failure(stderr: &str) -> RenderError {
    let detail = last_error_line(stderr);

    for re in [&*CANNOT_IMPORT_RE, &*NAME_ERROR_RE, &*NO_ATTRIBUTE_RE] {
        if let Some(name) = re.captures(stderr).and_then(|c| c.get(1)) {
            return RenderError::UnresolvedReference {
                name: name.as_str().to_string(),
                detail,
            };
        }
    }

    if let Some(module) = NO_MODULE_RE.captures(stderr).and_then(|c| c.get(1)) {
        let module = module.as_str();
        if module.starts_with(&format!("{}.", RENDERER_PACKAGE)) {
            return RenderError::UnresolvedReference {
                name: module.to_string(),
                detail,
            };
        }
        return RenderError::MissingModule {
            module: module.to_string(),
        };
    }

    if stderr.contains("SyntaxError") || stderr.contains("IndentationError") {
        return RenderError::Syntax(detail);
    }

    RenderError::Crashed(detail)
}

/// The final `XxxError: ...` line of a traceback, or the last non-empty line.
fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.contains("Error:") || l.contains("Exception:"))
        .or_else(|| lines.last())
        .map_or_else(|| "unknown error".to_string(), |l| l.to_string())
}

/// Artifact store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Artifact {0} does not exist")]
    Missing(PathBuf),

    #[error("Artifact path {0} has no file name")]
    InvalidPath(PathBuf),

    #[error("Failed to publish {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_cannot_import() {
        let stderr = r#"Traceback (most recent call last):
  File "diagram.py", line 2, in <module>
    from diagrams.azure.web import AppService
ImportError: cannot import name 'AppService' from 'diagrams.azure.web' (/x/web.py)
"#;
        let error = classify_failure(stderr);
        assert!(error.is_bad_reference());
        match error {
            RenderError::UnresolvedReference { name, detail } => {
                assert_eq!(name, "AppService");
                assert!(detail.starts_with("ImportError"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_name_and_attribute_errors() {
        let error = classify_failure("NameError: name 'Kafka' is not defined");
        assert!(matches!(error, RenderError::UnresolvedReference { ref name, .. } if name == "Kafka"));

        let error = classify_failure("AttributeError: module 'diagrams.azure.web' has no attribute 'KeyVault'");
        assert!(matches!(error, RenderError::UnresolvedReference { ref name, .. } if name == "KeyVault"));
    }

    #[test]
    fn test_classify_missing_modules() {
        let error = classify_failure("ModuleNotFoundError: No module named 'diagrams.azure.containers'");
        assert!(error.is_bad_reference());

        let error = classify_failure("ModuleNotFoundError: No module named 'diagrams'");
        assert!(matches!(error, RenderError::MissingModule { ref module } if module == "diagrams"));
        assert!(!error.is_bad_reference());
        assert!(!error.is_source_problem());
    }

    #[test]
    fn test_classify_syntax_and_crash() {
        let error = classify_failure("  File \"diagram.py\", line 3\n    with Diagram(\nSyntaxError: '(' was never closed\n");
        assert!(matches!(error, RenderError::Syntax(ref d) if d.contains("never closed")));
        assert!(error.is_source_problem());

        let error = classify_failure("dot: command not found\n");
        assert!(matches!(error, RenderError::Crashed(ref d) if d == "dot: command not found"));
        assert!(matches!(classify_failure(""), RenderError::Crashed(ref d) if d == "unknown error"));
    }
}
