//! Prompt generation from the component catalog.
//!
//! The component reference in the system prompt is derived from the catalog,
//! so the model is only ever shown names the validator accepts.

use std::sync::LazyLock;

use df_core::Catalog;
use regex::Regex;

/// Names listed per reference line.
const NAMES_PER_LINE: usize = 6;

static PYTHON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:python|py)[ \t]*\r?\n(.*?)```").expect("python block pattern is valid"));

static PLAIN_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[ \t]*\r?\n(.*?)```").expect("plain block pattern is valid"));

static TAGGED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("tagged block pattern is valid"));

/// Prompt builder bound to a catalog.
pub struct PromptBuilder<'a> {
    catalog: &'a Catalog,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// System prompt: output rules plus the full component reference.
    pub fn system_prompt(&self) -> String {
        let namespace = self.catalog.namespace();
        format!(
            r#"You are an expert cloud architect who writes diagram code with the Python `diagrams` library.

## COMPONENT REFERENCE

Use ONLY these exact class names, imported from the module shown:

{reference}
## RULES

1. Always pass show=False to the Diagram() constructor
2. Use EXACT class names from the reference above, no variations
3. Import only what you use, from the module listed for it
4. Give every node a readable label and connect nodes with >>
5. Group related components logically

## EXAMPLE

```python
from diagrams import Diagram
from {namespace}.web import AppServices
from {namespace}.database import SQLDatabases
from {namespace}.security import KeyVaults

with Diagram("Architecture", show=False):
    webapp = AppServices("Web App")
    db = SQLDatabases("Database")
    vault = KeyVaults("Key Vault")

    webapp >> db
    webapp >> vault
```

Return ONLY the Python code in a ```python code block. No explanations outside the code."#,
            reference = self.component_reference(),
            namespace = namespace,
        )
    }

    /// User prompt for one architecture description.
    pub fn generation_prompt(&self, description: &str) -> String {
        format!(
            r#"Create a {provider} architecture diagram for the following description.

## DESCRIPTION

{description}

Return ONLY the Python code in a ```python code block."#,
            provider = self.catalog.provider(),
            description = description.trim(),
        )
    }

    /// Component reference grouped by module group.
    pub fn component_reference(&self) -> String {
        let namespace = self.catalog.namespace();
        let mut out = String::new();
        for group in self.catalog.module_groups() {
            out.push_str(&format!("{}:\n", group.to_uppercase()));
            let names = self.catalog.components_in(group);
            for chunk in names.chunks(NAMES_PER_LINE) {
                out.push_str(&format!("- from {}.{} import {}\n", namespace, group, chunk.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

/// Extract diagram source from a model response.
///
/// Tries, in order: a ```python block, an untagged block, a block with any
/// tag, then bare code starting at the first import or diagram statement.
pub fn extract_code_block(response: &str) -> Option<String> {
    for re in [&*PYTHON_BLOCK_RE, &*PLAIN_BLOCK_RE, &*TAGGED_BLOCK_RE] {
        if let Some(code) = re.captures(response).and_then(|c| c.get(1)) {
            let code = code.as_str().trim();
            if !code.is_empty() {
                return Some(code.to_string());
            }
        }
    }

    if !response.contains("from diagrams") && !response.contains("with Diagram") {
        return None;
    }
    let start = response
        .lines()
        .scan(0usize, |offset, line| {
            let at = *offset;
            *offset += line.len() + 1;
            Some((at, line.trim_start()))
        })
        .find(|(_, line)| {
            line.starts_with("from diagrams") || line.starts_with("import ") || line.starts_with("with Diagram")
        })
        .map_or(0, |(at, _)| at);

    let code = response[start..].trim();
    (!code.is_empty()).then(|| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_python_block() {
        let response = r#"Here's the diagram:

```python
from diagrams import Diagram
with Diagram("x", show=False):
    pass
```

Done."#;
        let code = extract_code_block(response).unwrap();
        assert!(code.starts_with("from diagrams import Diagram"));
        assert!(code.ends_with("pass"));
    }

    #[test]
    fn test_extract_untagged_and_tagged_blocks() {
        assert_eq!(extract_code_block("```\nx = 1\n```").as_deref(), Some("x = 1"));
        assert_eq!(extract_code_block("```python3\nx = 2\n```").as_deref(), Some("x = 2"));
    }

    #[test]
    fn test_extract_inline_code() {
        let response = "Sure thing.\nfrom diagrams import Diagram\nwith Diagram(\"x\", show=False):\n    pass\n";
        let code = extract_code_block(response).unwrap();
        assert!(code.starts_with("from diagrams import Diagram"));
    }

    #[test]
    fn test_extract_nothing() {
        assert_eq!(extract_code_block("I cannot help with that."), None);
        assert_eq!(extract_code_block("```python\n\n```"), None);
        assert_eq!(extract_code_block(""), None);
    }

    #[test]
    fn test_system_prompt_lists_catalog() {
        let catalog = Catalog::builtin().unwrap();
        let builder = PromptBuilder::new(&catalog);
        let system = builder.system_prompt();

        assert!(system.contains("from diagrams.azure.security import"));
        assert!(system.contains("KeyVaults"));
        assert!(system.contains("show=False"));
        for group in catalog.module_groups() {
            assert!(system.contains(&format!("{}:\n", group.to_uppercase())));
        }
    }

    #[test]
    fn test_generation_prompt_embeds_description() {
        let catalog = Catalog::builtin().unwrap();
        let prompt = PromptBuilder::new(&catalog).generation_prompt("  web app with a redis cache  ");
        assert!(prompt.contains("\nweb app with a redis cache\n"));
        assert!(prompt.contains(catalog.provider()));
    }
}
