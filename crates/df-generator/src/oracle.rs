//! Source-text oracles.
//!
//! An oracle turns a user's architecture description into diagram source.
//! [`ClaudeOracle`] asks the model; [`CatalogOracle`] composes source from
//! keyword matches against the catalog and never leaves the process.

use std::sync::Arc;

use async_trait::async_trait;
use df_core::{compose_source, suggest_for_description, Catalog};

use crate::client::{ClaudeClient, ClientError, Message};
use crate::prompt::{extract_code_block, PromptBuilder};

/// Produces diagram source text for a description.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// The oracle returned nothing usable.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("No code block found in response: {0}")]
    NoCodeInResponse(String),

    #[error("No suitable components found for the given description")]
    NoComponents,
}

/// Oracle backed by the Claude Messages API.
pub struct ClaudeOracle {
    client: ClaudeClient,
    catalog: Arc<Catalog>,
    system: String,
}

impl ClaudeOracle {
    pub fn new(client: ClaudeClient, catalog: Arc<Catalog>) -> Self {
        let system = PromptBuilder::new(&catalog).system_prompt();
        Self {
            client,
            catalog,
            system,
        }
    }

    /// Build from `ANTHROPIC_API_KEY` / `DIAGRAM_MODEL`.
    pub fn from_env(catalog: Arc<Catalog>) -> Result<Self, ClientError> {
        Ok(Self::new(ClaudeClient::from_env()?, catalog))
    }
}

#[async_trait]
impl Oracle for ClaudeOracle {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let user = PromptBuilder::new(&self.catalog).generation_prompt(prompt);
        let response = self
            .client
            .complete_with_system(vec![Message::user(user)], Some(self.system.clone()))
            .await?;

        extract_code_block(&response).ok_or(GenerationError::NoCodeInResponse(response))
    }

    fn name(&self) -> &str {
        self.client.model()
    }
}

/// Offline oracle composing source from keyword-matched catalog components.
pub struct CatalogOracle {
    catalog: Arc<Catalog>,
}

impl CatalogOracle {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Oracle for CatalogOracle {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let components = suggest_for_description(&self.catalog, prompt);
        if components.is_empty() {
            return Err(GenerationError::NoComponents);
        }
        Ok(compose_source(&self.catalog, &components, prompt))
    }

    fn name(&self) -> &str {
        "catalog"
    }
}

#[cfg(test)]
mod tests {
    use df_core::{extract_references, Validator};

    use super::*;

    #[tokio::test]
    async fn test_catalog_oracle_composes_valid_source() {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let oracle = CatalogOracle::new(catalog.clone());

        let source = oracle.generate("React frontend with a postgres database and redis cache").await.unwrap();
        assert!(source.contains("show=False"));

        let names: Vec<_> = extract_references(&source).into_iter().map(|r| r.name).collect();
        assert!(!names.is_empty());
        assert!(Validator::new(&catalog).validate_many(&names).all_valid());
    }

    #[tokio::test]
    async fn test_catalog_oracle_without_matches() {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let error = CatalogOracle::new(catalog).generate("zzz").await.unwrap_err();
        assert!(matches!(error, GenerationError::NoComponents));
    }

    #[test]
    fn test_claude_oracle_system_prompt() {
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let client = ClaudeClient::new(crate::client::ClaudeConfig::new("test-key")).unwrap();
        let oracle = ClaudeOracle::new(client, catalog);
        assert!(oracle.system.contains("COMPONENT REFERENCE"));
        assert_eq!(oracle.name(), "claude-sonnet-4-20250514");
    }
}
