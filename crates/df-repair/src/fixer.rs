//! The auto-fixer: runs the rule list over a parsed source model.

use df_core::{Catalog, CorrectionTable};
use serde::Serialize;

use crate::rules::{default_rules, RepairContext, RepairRule};
use crate::source::SourceModel;

/// One rewrite applied to source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixRecord {
    /// Name of the rule that made the change
    pub rule: String,
    /// Human-readable description
    pub description: String,
}

impl FixRecord {
    pub fn new(rule: &str, description: String) -> Self {
        Self {
            rule: rule.to_string(),
            description,
        }
    }
}

/// Output of one fixer pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixResult {
    pub corrected_text: String,
    pub fixes: Vec<FixRecord>,
}

impl FixResult {
    pub fn changed(&self) -> bool {
        !self.fixes.is_empty()
    }

    /// Fix descriptions in application order.
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.fixes.iter().map(|f| f.description.as_str())
    }
}

/// Deterministic rule-based fixer over a borrowed catalog.
pub struct AutoFixer<'a> {
    catalog: &'a Catalog,
    corrections: CorrectionTable,
    rules: Vec<Box<dyn RepairRule>>,
}

impl<'a> AutoFixer<'a> {
    /// Build a fixer with the six standard rules.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_rules(catalog, default_rules())
    }

    /// Build a fixer with a custom rule list.
    pub fn with_rules(catalog: &'a Catalog, rules: Vec<Box<dyn RepairRule>>) -> Self {
        Self {
            catalog,
            corrections: catalog.correction_table(),
            rules,
        }
    }

    /// Rule names in application order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn corrections(&self) -> &CorrectionTable {
        &self.corrections
    }

    /// Apply every matching rule once, in order.
    #[must_use]
    pub fn fix(&self, source: &str) -> FixResult {
        let ctx = RepairContext {
            catalog: self.catalog,
            corrections: &self.corrections,
        };
        let mut model = SourceModel::parse(source);
        let mut fixes = Vec::new();

        for rule in &self.rules {
            if !rule.matches(&model, &ctx) {
                continue;
            }
            let applied = rule.rewrite(&mut model, &ctx);
            tracing::debug!(rule = rule.name(), fixes = applied.len(), "applied repair rule");
            fixes.extend(applied);
        }

        let corrected_text = if fixes.is_empty() {
            source.to_string()
        } else {
            model.render()
        };
        FixResult {
            corrected_text,
            fixes,
        }
    }
}

#[cfg(test)]
mod tests {
    use df_core::{extract_references, references_in_namespace, score, Validator};

    use super::*;

    const MESSY: &str = r#"from diagrams import Diagram, Edge
from diagrams.azure.web import AppService, KeyVault
from diagrams.azure.database import SqlDatabase, RedisCluster
from diagrams.azure.integration import Kafka
from diagrams.onprem.client import User

with Diagram("Kafka & KeyVault demo", show=True, filename="demo", show=False):
    user = User("user")
    web = AppService("web")
    vault = KeyVault("KeyVault secrets")  # KeyVault stays in comments
    db = SqlDatabase("db")
    cache = RedisCluster("cache")
    stream = Kafka("events")

    user >> web >> Edge(label="reads") >> db
    web >> stream >> cache
    web >> vault
"#;

    fn fixer_fixes(source: &str) -> FixResult {
        let catalog = Catalog::builtin().unwrap();
        AutoFixer::new(&catalog).fix(source)
    }

    #[test]
    fn test_rule_names() {
        let catalog = Catalog::builtin().unwrap();
        let fixer = AutoFixer::new(&catalog);
        assert_eq!(fixer.rule_names().len(), 6);
        assert_eq!(fixer.rule_names()[0], "synonym");
        assert!(!fixer.corrections().is_empty());
    }

    #[test]
    fn test_full_repair() {
        let result = fixer_fixes(MESSY);
        let expected = r#"from diagrams import Diagram, Edge
from diagrams.azure.web import AppServices
from diagrams.azure.security import KeyVaults
from diagrams.azure.database import SQLDatabases, CacheForRedis
from diagrams.onprem.client import User

with Diagram("Kafka & KeyVault demo", show=False):
    user = User("user")
    web = AppServices("web")
    vault = KeyVaults("KeyVault secrets")  # KeyVault stays in comments
    db = SQLDatabases("db")
    cache = CacheForRedis("cache")

    user >> web >> Edge(label="reads") >> db
    web >> cache
    web >> vault
"#;
        assert_eq!(result.corrected_text, expected);

        let rules: Vec<_> = result.fixes.iter().map(|f| f.rule.as_str()).collect();
        assert!(rules.contains(&"synonym"));
        assert!(rules.contains(&"relocation"));
        assert!(rules.contains(&"replacement"));
        assert!(rules.contains(&"removal"));
        assert!(rules.contains(&"diagram-options"));
    }

    #[test]
    fn test_idempotent() {
        let sources = [
            MESSY,
            "",
            "print('hello')\n",
            "from diagrams.azure.web import KeyVaults, AppServices\n",
            "from diagrams.azure.integration import Kafka\nwith Diagram(\"x\"):\n    k = Kafka(\"k\")\n\n\n",
            "with Diagram(\n    \"x\",\n    show=True,\n):\n    pass\n",
            "with Diagram(\n    \"x\",  # title\n    show=True,  # debug\n):\n    pass\n",
            "from diagrams import Diagram\nwith Diagram(\"x\", show=False):\n    web\u{a0}= 1\n",
        ];
        let catalog = Catalog::builtin().unwrap();
        let fixer = AutoFixer::new(&catalog);
        for source in sources {
            let once = fixer.fix(source);
            let twice = fixer.fix(&once.corrected_text);
            assert_eq!(twice.corrected_text, once.corrected_text, "not idempotent for {:?}", source);
            assert!(twice.fixes.is_empty(), "extra fixes {:?} for {:?}", twice.fixes, source);
        }
    }

    #[test]
    fn test_non_ascii_code_bytes() {
        let source = "from diagrams import Diagram\nfrom diagrams.azure.security import KeyVault\n\nwith Diagram(\"Caf\u{e9}\", show=True):\n    coffre = KeyVault(\"coffre\")\u{a0}\n    web\u{a0}= 1\n    coffre >> web\u{a0}\n";
        let catalog = Catalog::builtin().unwrap();
        let fixer = AutoFixer::new(&catalog);

        let once = fixer.fix(source);
        assert!(once.corrected_text.contains("with Diagram(\"Caf\u{e9}\", show=False):"));
        assert!(once.corrected_text.contains("    coffre = KeyVaults(\"coffre\")\u{a0}\n"));
        assert!(once.corrected_text.contains("    coffre >> web\u{a0}\n"));
        assert_eq!(once.corrected_text.matches("show=").count(), 1);

        let twice = fixer.fix(&once.corrected_text);
        assert_eq!(twice.corrected_text, once.corrected_text);
        assert!(twice.fixes.is_empty());
    }

    #[test]
    fn test_comments_in_multi_line_declaration() {
        let source = "from diagrams import Diagram\n\nwith Diagram(\n    \"App\",  # title\n    show=True,\n    direction=\"LR\",  # layout\n):\n    pass\n";
        let catalog = Catalog::builtin().unwrap();
        let fixer = AutoFixer::new(&catalog);

        let once = fixer.fix(source);
        assert_eq!(
            once.corrected_text,
            "from diagrams import Diagram\n\nwith Diagram(\"App\", show=False, direction=\"LR\"):\n    pass\n"
        );
        assert_eq!(once.corrected_text.matches("show=").count(), 1);

        let twice = fixer.fix(&once.corrected_text);
        assert_eq!(twice.corrected_text, once.corrected_text);
        assert!(twice.fixes.is_empty());
    }

    #[test]
    fn test_scenario_plural_correction() {
        let source = "from diagrams import Diagram\nfrom diagrams.azure.security import KeyVault\n\nwith Diagram(\"Vault\", show=False):\n    kv = KeyVault(\"kv\")\n";
        let result = fixer_fixes(source);
        assert_eq!(
            result.corrected_text,
            "from diagrams import Diagram\nfrom diagrams.azure.security import KeyVaults\n\nwith Diagram(\"Vault\", show=False):\n    kv = KeyVaults(\"kv\")\n"
        );
        assert_eq!(result.fixes.len(), 1);
        assert_eq!(result.fixes[0].description, "Corrected 'KeyVault' to 'KeyVaults'");
    }

    #[test]
    fn test_scenario_unknown_component_removed() {
        let source = "from diagrams import Diagram\nfrom diagrams.azure.web import AppServices\nfrom diagrams.azure.integration import Kafka\n\nwith Diagram(\"Events\", show=False):\n    web = AppServices(\"web\")\n    bus = Kafka(\"bus\")\n    web >> bus\n";
        let result = fixer_fixes(source);
        assert!(!result.corrected_text.contains("Kafka"));
        assert!(!result.corrected_text.contains("bus"));

        let catalog = Catalog::builtin().unwrap();
        let refs = references_in_namespace(&extract_references(&result.corrected_text), "diagrams.azure");
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        let batch = Validator::new(&catalog).validate_many(&names);
        assert_eq!(batch.total, 1);
        assert_eq!(score(batch.valid_count, batch.total), 100);
    }

    #[test]
    fn test_relocation_preserves_sibling() {
        let result = fixer_fixes("from diagrams.azure.web import KeyVaults, AppServices\n");
        let refs = extract_references(&result.corrected_text);
        let vault = refs.iter().find(|r| r.name == "KeyVaults").unwrap();
        let web = refs.iter().find(|r| r.name == "AppServices").unwrap();
        assert_eq!(vault.module_group, "security");
        assert_eq!(web.module_group, "web");
    }

    #[test]
    fn test_score_not_lowered_by_fixing() {
        let catalog = Catalog::builtin().unwrap();
        let validator = Validator::new(&catalog);
        let score_of = |text: &str| {
            let refs = references_in_namespace(&extract_references(text), "diagrams.azure");
            let names: Vec<_> = refs.iter().map(|r| r.name.clone()).collect();
            let batch = validator.validate_many(&names);
            score(batch.valid_count, batch.total)
        };
        let fixed = fixer_fixes(MESSY);
        assert!(score_of(&fixed.corrected_text) >= score_of(MESSY));
        assert_eq!(score_of(&fixed.corrected_text), 100);
    }

    #[test]
    fn test_clean_source_untouched() {
        let source = "from diagrams import Diagram\nfrom diagrams.azure.web import AppServices\n\nwith Diagram(\"Web\", show=False):\n    AppServices(\"web\")\n";
        let result = fixer_fixes(source);
        assert!(!result.changed());
        assert_eq!(result.corrected_text, source);
    }
}
