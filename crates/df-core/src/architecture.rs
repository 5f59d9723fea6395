//! Keyword-driven component suggestions for a natural-language description,
//! and deterministic diagram source composed from them.
//!
//! This path never consults a model: each architecture pattern lists the
//! hint words that trigger it and the components it contributes.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::catalog::Catalog;

/// Longest title kept before truncation.
const TITLE_MAX_CHARS: usize = 50;

struct Pattern {
    id: &'static str,
    label: &'static str,
    keywords: &'static [&'static str],
    components: &'static [&'static str],
}

const PATTERNS: &[Pattern] = &[
    Pattern {
        id: "web_frontend",
        label: "Web Frontend",
        keywords: &["react", "frontend", "web app", "spa", "angular", "vue", "static"],
        components: &["AppServices", "ContainerApps", "FrontDoors"],
    },
    Pattern {
        id: "api_backend",
        label: "Backend API",
        keywords: &["backend", "api", "rest", "nodejs", "python", "fastapi", "express"],
        components: &["AppServices", "ContainerApps", "FunctionApps"],
    },
    Pattern {
        id: "database",
        label: "Database",
        keywords: &["database", "db", "postgresql", "postgres", "mysql", "sql"],
        components: &["DatabaseForPostgresqlServers", "DatabaseForMysqlServers", "SQLDatabases"],
    },
    Pattern {
        id: "nosql",
        label: "NoSQL Database",
        keywords: &["mongodb", "nosql", "cosmos", "document", "json"],
        components: &["CosmosDb"],
    },
    Pattern {
        id: "cache",
        label: "Cache",
        keywords: &["cache", "redis", "caching", "session"],
        components: &["CacheForRedis"],
    },
    Pattern {
        id: "storage",
        label: "Storage",
        keywords: &["storage", "blob", "file", "images", "documents", "assets"],
        components: &["BlobStorage", "StorageAccounts"],
    },
    Pattern {
        id: "container",
        label: "Container Service",
        keywords: &["docker", "container", "kubernetes", "k8s"],
        components: &["ContainerApps", "ContainerInstances", "KubernetesServices"],
    },
    Pattern {
        id: "messaging",
        label: "Messaging",
        keywords: &["queue", "message", "event", "notification"],
        components: &["ServiceBus", "EventHubs"],
    },
    Pattern {
        id: "auth",
        label: "Authentication",
        keywords: &["auth", "authentication", "login", "security", "identity"],
        components: &["KeyVaults", "ActiveDirectory"],
    },
];

/// A component chosen for a described architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSuggestion {
    /// Architecture pattern that contributed the component
    pub pattern: String,
    /// Hint word in the description that triggered the pattern
    pub keyword: String,
    /// Node label used when composing source
    pub label: String,
    pub canonical_name: String,
    pub module_group: String,
}

/// Suggest catalog components for a natural-language description.
///
/// Patterns are matched by case-insensitive substring. Components are
/// deduplicated by canonical name, first pattern wins, and components the
/// catalog does not know are skipped.
pub fn suggest_for_description(catalog: &Catalog, description: &str) -> Vec<ComponentSuggestion> {
    let description = description.to_lowercase();
    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();

    for pattern in PATTERNS {
        let Some(keyword) = pattern.keywords.iter().find(|k| description.contains(*k)) else {
            continue;
        };
        for name in pattern.components {
            let Some(entry) = catalog.lookup_canonical(name) else {
                continue;
            };
            if !seen.insert(entry.canonical_name.clone()) {
                continue;
            }
            suggestions.push(ComponentSuggestion {
                pattern: pattern.id.to_string(),
                keyword: keyword.to_string(),
                label: pattern.label.to_string(),
                canonical_name: entry.canonical_name.clone(),
                module_group: entry.module_group.clone(),
            });
        }
    }

    suggestions
}

/// Compose renderable diagram source for a set of suggested components.
///
/// Imports are grouped by module group, nodes are declared in suggestion
/// order and chained left to right.
pub fn compose_source(catalog: &Catalog, components: &[ComponentSuggestion], title: &str) -> String {
    let mut by_group: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for component in components {
        let names = by_group.entry(component.module_group.as_str()).or_default();
        if !names.contains(&component.canonical_name.as_str()) {
            names.push(component.canonical_name.as_str());
        }
    }

    let mut lines = vec!["from diagrams import Diagram".to_string()];
    for (group, mut names) in by_group {
        names.sort_unstable();
        lines.push(format!(
            "from {}.{} import {}",
            catalog.namespace(),
            group,
            names.join(", ")
        ));
    }
    lines.push(String::new());
    lines.push(format!(
        "with Diagram(\"{}\", show=False, direction=\"TB\"):",
        escape_title(title)
    ));

    if components.is_empty() {
        lines.push("    pass".to_string());
        return lines.join("\n") + "\n";
    }

    let variables = variable_names(components);
    for (component, variable) in components.iter().zip(&variables) {
        lines.push(format!(
            "    {} = {}(\"{}\")",
            variable, component.canonical_name, component.label
        ));
    }

    if variables.len() >= 2 {
        lines.push(String::new());
        for pair in variables.windows(2) {
            lines.push(format!("    {} >> {}", pair[0], pair[1]));
        }
    }

    lines.join("\n") + "\n"
}

/// One variable per component, numbered within a pattern after the first.
fn variable_names(components: &[ComponentSuggestion]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    components
        .iter()
        .map(|c| {
            let count = counts.entry(c.pattern.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                c.pattern.clone()
            } else {
                format!("{}_{}", c.pattern, count)
            }
        })
        .collect()
}

fn escape_title(title: &str) -> String {
    let title = title.trim();
    let truncated: String = if title.chars().count() > TITLE_MAX_CHARS {
        let mut t: String = title.chars().take(TITLE_MAX_CHARS).collect();
        t.push_str("...");
        t
    } else {
        title.to_string()
    };
    truncated
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract_references, structural_warnings};
    use crate::validator::Validator;

    #[test]
    fn test_suggest_for_description() {
        let catalog = Catalog::builtin().unwrap();
        let suggestions =
            suggest_for_description(&catalog, "A React frontend with a Python API and PostgreSQL");

        let names: Vec<_> = suggestions.iter().map(|s| s.canonical_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "AppServices",
                "ContainerApps",
                "FrontDoors",
                "FunctionApps",
                "DatabaseForPostgresqlServers",
                "DatabaseForMysqlServers",
                "SQLDatabases",
            ]
        );
        assert_eq!(suggestions[0].label, "Web Frontend");
        assert_eq!(suggestions[0].keyword, "react");
        assert_eq!(suggestions[3].pattern, "api_backend");
    }

    #[test]
    fn test_suggest_for_description_no_match() {
        let catalog = Catalog::builtin().unwrap();
        assert!(suggest_for_description(&catalog, "hello world").is_empty());
        assert!(suggest_for_description(&catalog, "").is_empty());
    }

    #[test]
    fn test_compose_source_is_valid() {
        let catalog = Catalog::builtin().unwrap();
        let components = suggest_for_description(&catalog, "redis cache and blob storage");
        let source = compose_source(&catalog, &components, "Cache \"and\" storage");

        assert!(source.contains("from diagrams.azure.database import CacheForRedis\n"));
        assert!(source.contains("from diagrams.azure.storage import BlobStorage, StorageAccounts\n"));
        assert!(source.contains("with Diagram(\"Cache \\\"and\\\" storage\", show=False, direction=\"TB\"):"));
        assert!(source.contains("    storage_2 = StorageAccounts(\"Storage\")\n"));
        assert!(source.contains("    cache >> storage\n"));
        assert!(structural_warnings(&source).is_empty());

        let refs = extract_references(&source);
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert!(Validator::new(&catalog).validate_many(&names).all_valid());
    }

    #[test]
    fn test_compose_source_empty_and_long_title() {
        let catalog = Catalog::builtin().unwrap();
        let title = "x".repeat(80);
        let source = compose_source(&catalog, &[], &title);
        assert!(source.contains(&format!("with Diagram(\"{}...\"", "x".repeat(50))));
        assert!(source.ends_with("    pass\n"));
    }
}
