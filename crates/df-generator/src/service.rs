//! Public operation surface.
//!
//! [`DiagramService`] is the explicitly owned context every request goes
//! through. It holds the catalog and the collaborator handles built once at
//! startup; each `generate_and_validate` call runs its own loop.

use std::sync::Arc;
use std::time::Instant;

use df_core::{compose_source, suggest_for_description, BatchValidation, Catalog, ComponentSuggestion, ValidationReport, Validator};
use df_render::{BlobStore, Renderer};
use df_repair::{AutoFixer, FixResult};

use crate::oracle::Oracle;
use crate::pipeline::{render_and_publish, validate_source, GenerationLoop, GenerationOutcome, PipelineConfig};

/// Request errors raised before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Description must not be empty")]
    EmptyDescription,

    #[error("No suitable components found for the given description")]
    NoComponents,
}

/// Diagram generation service.
#[derive(Clone)]
pub struct DiagramService {
    catalog: Arc<Catalog>,
    oracle: Arc<dyn Oracle>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn BlobStore>,
    config: PipelineConfig,
}

impl DiagramService {
    pub fn new(
        catalog: Arc<Catalog>,
        oracle: Arc<dyn Oracle>,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn BlobStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            oracle,
            renderer,
            store,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the generation loop under the loop timeout.
    ///
    /// When the loop times out, one fast attempt (oracle then render, no
    /// validation loop) runs under its own shorter timeout.
    pub async fn generate_and_validate(&self, description: &str) -> Result<GenerationOutcome, ServiceError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ServiceError::EmptyDescription);
        }

        let start = Instant::now();
        let generation = GenerationLoop::new(
            &self.catalog,
            self.oracle.as_ref(),
            self.renderer.as_ref(),
            self.store.as_ref(),
            &self.config,
        );

        match tokio::time::timeout(self.config.loop_timeout, generation.run(description)).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                tracing::warn!(timeout = ?self.config.loop_timeout, "generation loop timed out, using fallback");
                Ok(self.fallback(description, start).await)
            }
        }
    }

    async fn fallback(&self, description: &str, start: Instant) -> GenerationOutcome {
        let attempt = async {
            let source = self.oracle.generate(description).await.map_err(|e| e.to_string())?;
            let locator = render_and_publish(self.renderer.as_ref(), self.store.as_ref(), &source)
                .await
                .map_err(|e| format!("Render failed: {}", e))?;
            Ok::<_, String>((source, locator))
        };

        let warning = format!(
            "Generation loop timed out after {}s, used fast fallback",
            self.config.loop_timeout.as_secs()
        );
        let result = tokio::time::timeout(self.config.fallback_timeout, attempt).await;

        let (source, locator, error) = match result {
            Ok(Ok((source, locator))) => (source, Some(locator), None),
            Ok(Err(e)) => (String::new(), None, Some(format!("Fallback failed: {}", e))),
            Err(_) => (
                String::new(),
                None,
                Some(format!("Fallback timed out after {}s", self.config.fallback_timeout.as_secs())),
            ),
        };

        let validation = (!source.is_empty()).then(|| validate_source(&self.catalog, &source));
        GenerationOutcome {
            success: locator.is_some(),
            render_locator: locator,
            final_source_text: source,
            iteration_count: 0,
            validation,
            best: None,
            last: None,
            error,
            warning: Some(warning),
            fallback_used: true,
            duration: start.elapsed(),
        }
    }

    /// Validate a list of component names.
    pub fn validate_only<S: AsRef<str>>(&self, names: &[S]) -> BatchValidation {
        Validator::new(&self.catalog).validate_many(names)
    }

    /// Validate every catalog reference in a source text.
    pub fn validate_source(&self, source: &str) -> ValidationReport {
        validate_source(&self.catalog, source)
    }

    /// Keyword-driven component suggestions, independent of the oracle.
    pub fn suggest_for_description(&self, description: &str) -> Vec<ComponentSuggestion> {
        suggest_for_description(&self.catalog, description)
    }

    /// Run the auto-fixer once.
    pub fn fix_source(&self, source: &str) -> FixResult {
        AutoFixer::new(&self.catalog).fix(source)
    }

    /// Compose renderable source from keyword-matched components.
    pub fn compose_source(&self, description: &str, title: Option<&str>) -> Result<String, ServiceError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ServiceError::EmptyDescription);
        }
        let components = self.suggest_for_description(description);
        if components.is_empty() {
            return Err(ServiceError::NoComponents);
        }
        Ok(compose_source(&self.catalog, &components, title.unwrap_or(description)))
    }
}
