//! The generate → validate → fix → render loop.
//!
//! ```text
//! GENERATING ─> EXTRACTING ─> VALIDATING ─> FIXING ─> RENDERING ─┬─> SUCCESS
//!     ▲                                                          │
//!     └──────────────────────────── RETRY <──────────────────────┴─> FAILED
//! ```
//!
//! The oracle is asked once. Later iterations work on the text the fixer
//! produced in the previous iteration, and only go back to the oracle when
//! no such text exists. Every oracle and renderer error is caught and turned
//! into a retry until the iteration cap is reached.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use df_core::{
    extract_references, references_in_namespace, structural_warnings, Catalog, ValidationReport, Validator,
};
use df_render::{new_artifact_id, BlobStore, RenderError, Renderer};
use df_repair::AutoFixer;
use serde::Serialize;

use crate::oracle::Oracle;

/// Loop configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Iteration cap
    pub max_iterations: u32,
    /// Minimum score accepted for a rendered diagram
    pub acceptance_score: u8,
    /// Accept a rendered diagram whose score is 0
    pub accept_zero_score: bool,
    /// Wall-clock limit for the whole loop
    pub loop_timeout: Duration,
    /// Wall-clock limit for the fallback attempt
    pub fallback_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            acceptance_score: 70,
            accept_zero_score: true,
            loop_timeout: Duration::from_secs(120),
            fallback_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Quick config for interactive use.
    pub fn quick() -> Self {
        Self {
            max_iterations: 1,
            loop_timeout: Duration::from_secs(60),
            fallback_timeout: Duration::from_secs(20),
            ..Default::default()
        }
    }

    /// Thorough config: more iterations, strict acceptance.
    pub fn thorough() -> Self {
        Self {
            max_iterations: 3,
            acceptance_score: 90,
            accept_zero_score: false,
            loop_timeout: Duration::from_secs(300),
            ..Default::default()
        }
    }

    /// Acceptance policy for a diagram that rendered.
    pub fn accepts(&self, validation: &ValidationReport) -> bool {
        validation.is_valid
            || validation.score >= self.acceptance_score
            || (validation.score == 0 && self.accept_zero_score)
    }
}

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    Generating,
    Extracting,
    Validating,
    Fixing,
    Rendering,
    Retry,
    Success,
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Success | LoopState::Failed)
    }
}

/// What happened in one iteration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationReport {
    /// 1-indexed
    pub iteration: u32,
    /// Text that was validated and handed to the renderer
    pub source_text: String,
    /// Fixer output, the starting point of the next iteration
    pub corrected_text: String,
    pub validation: Option<ValidationReport>,
    /// Fix descriptions, baseline pass included
    pub fixes: Vec<String>,
    pub render_locator: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl IterationReport {
    fn new(iteration: u32) -> Self {
        Self {
            iteration,
            ..Default::default()
        }
    }

    pub fn score(&self) -> Option<u8> {
        self.validation.as_ref().map(|v| v.score)
    }

    pub fn is_valid(&self) -> bool {
        self.validation.as_ref().is_some_and(|v| v.is_valid)
    }
}

/// Result handed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub success: bool,
    /// Only set once the renderer confirmed the artifact
    pub render_locator: Option<String>,
    pub final_source_text: String,
    /// Loop iterations run; zero when only the fallback ran
    pub iteration_count: u32,
    /// Validation report of the last iteration
    pub validation: Option<ValidationReport>,
    /// Highest-scoring iteration
    pub best: Option<IterationReport>,
    /// Most recent iteration
    pub last: Option<IterationReport>,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub fallback_used: bool,
    pub duration: Duration,
}

impl GenerationOutcome {
    /// Format as a summary string.
    pub fn format_summary(&self) -> String {
        let status = if self.success { "SUCCESS" } else { "FAILED" };
        let mut summary = format!(
            "[{}] Generation completed in {:.2}s\n",
            status,
            self.duration.as_secs_f64(),
        );

        summary.push_str(&format!("  Iterations: {}\n", self.iteration_count));
        if self.fallback_used {
            summary.push_str("  Fallback: used\n");
        }
        if let Some(ref locator) = self.render_locator {
            summary.push_str(&format!("  Diagram: {}\n", locator));
        }
        if let Some(ref warning) = self.warning {
            summary.push_str(&format!("  Warning: {}\n", warning));
        }
        if let Some(ref best) = self.best {
            if let Some(score) = best.score() {
                summary.push_str(&format!("  Best score: {}/100 (iteration {})\n", score, best.iteration));
            }
        }

        if let Some(ref validation) = self.validation {
            summary.push('\n');
            summary.push_str(&validation.format_report());
        }

        if !self.success {
            summary.push_str(&format!(
                "\nGeneration failed: {}\n",
                self.error.as_deref().unwrap_or("unknown error")
            ));
        }

        summary
    }
}

/// Validate one source text against the catalog.
pub fn validate_source(catalog: &Catalog, source: &str) -> ValidationReport {
    let references = references_in_namespace(&extract_references(source), catalog.namespace());
    let names: Vec<&str> = references.iter().map(|r| r.name.as_str()).collect();
    let batch = Validator::new(catalog).validate_many(&names);
    ValidationReport::from_batch(&batch, structural_warnings(source))
}

/// Render `source` and publish the artifact.
///
/// The locator is the store's public URL, or the local path when the store
/// keeps artifacts local or fails to publish.
pub async fn render_and_publish(
    renderer: &dyn Renderer,
    store: &dyn BlobStore,
    source: &str,
) -> Result<String, RenderError> {
    let artifact_id = new_artifact_id();
    let path = renderer.render(source, &artifact_id).await?;

    let locator = match store.store(&path).await {
        Ok(Some(url)) => url,
        Ok(None) => path.display().to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "publishing failed, keeping local path");
            path.display().to_string()
        }
    };
    Ok(locator)
}

/// One request's loop. Owns all mutable iteration state.
pub struct GenerationLoop<'a> {
    catalog: &'a Catalog,
    oracle: &'a dyn Oracle,
    renderer: &'a dyn Renderer,
    store: &'a dyn BlobStore,
    config: &'a PipelineConfig,
    fixer: AutoFixer<'a>,
}

impl<'a> GenerationLoop<'a> {
    pub fn new(
        catalog: &'a Catalog,
        oracle: &'a dyn Oracle,
        renderer: &'a dyn Renderer,
        store: &'a dyn BlobStore,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            oracle,
            renderer,
            store,
            config,
            fixer: AutoFixer::new(catalog),
        }
    }

    fn transition(state: &mut LoopState, next: LoopState, iteration: u32) {
        tracing::debug!(iteration, from = ?state, to = ?next, "loop transition");
        *state = next;
    }

    /// Run the loop to a terminal state.
    pub async fn run(&self, description: &str) -> GenerationOutcome {
        let start = Instant::now();
        let mut state = LoopState::Generating;
        let mut best: Option<IterationReport> = None;
        let mut last: Option<IterationReport> = None;
        let mut corrected: Option<String> = None;
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<String> = None;
        let mut iteration_count = 0;

        tracing::info!(oracle = self.oracle.name(), max_iterations = self.config.max_iterations, "generation started");

        for iteration in 1..=self.config.max_iterations {
            iteration_count = iteration;
            let report = self
                .run_iteration(iteration, description, corrected.as_deref(), &mut state, &mut tried)
                .await;

            if let Some(ref error) = report.error {
                tracing::warn!(iteration, %error, "iteration failed");
                last_error = Some(error.clone());
            }
            if !report.corrected_text.is_empty() {
                corrected = Some(report.corrected_text.clone());
            }
            let accepted = report.render_locator.is_some()
                && report.validation.as_ref().is_some_and(|v| self.config.accepts(v));

            if report.validation.is_some() && report.score() > best.as_ref().and_then(IterationReport::score) {
                best = Some(report.clone());
            }
            tracing::info!(
                iteration,
                score = report.score(),
                rendered = report.render_locator.is_some(),
                accepted,
                "iteration finished"
            );
            last = Some(report);

            if accepted {
                Self::transition(&mut state, LoopState::Success, iteration);
                let last = last.take();
                return GenerationOutcome {
                    success: true,
                    render_locator: last.as_ref().and_then(|r| r.render_locator.clone()),
                    final_source_text: last.as_ref().map(|r| r.source_text.clone()).unwrap_or_default(),
                    iteration_count,
                    validation: last.as_ref().and_then(|r| r.validation.clone()),
                    best,
                    last,
                    error: None,
                    warning: None,
                    fallback_used: false,
                    duration: start.elapsed(),
                };
            }
            Self::transition(&mut state, LoopState::Retry, iteration);
        }

        // One last render of corrected text the renderer has not seen yet.
        if let Some(text) = corrected.as_ref().filter(|t| !tried.contains(*t)) {
            Self::transition(&mut state, LoopState::Rendering, iteration_count);
            match render_and_publish(self.renderer, self.store, text).await {
                Ok(locator) => {
                    Self::transition(&mut state, LoopState::Success, iteration_count);
                    return GenerationOutcome {
                        success: true,
                        render_locator: Some(locator),
                        final_source_text: text.clone(),
                        iteration_count,
                        validation: Some(validate_source(self.catalog, text)),
                        best,
                        last,
                        error: None,
                        warning: Some("Used corrected source after max iterations".to_string()),
                        fallback_used: false,
                        duration: start.elapsed(),
                    };
                }
                Err(e) => last_error = Some(format!("Final render failed: {}", e)),
            }
        }

        Self::transition(&mut state, LoopState::Failed, iteration_count);
        debug_assert!(state.is_terminal());
        let final_source_text = corrected
            .or_else(|| last.as_ref().map(|r| r.source_text.clone()))
            .unwrap_or_default();
        GenerationOutcome {
            success: false,
            render_locator: None,
            final_source_text,
            iteration_count,
            validation: last.as_ref().and_then(|r| r.validation.clone()),
            best,
            last,
            error: Some(format!(
                "Max iterations reached. Last error: {}",
                last_error.as_deref().unwrap_or("Validation failed")
            )),
            warning: None,
            fallback_used: false,
            duration: start.elapsed(),
        }
    }

    async fn run_iteration(
        &self,
        iteration: u32,
        description: &str,
        previous: Option<&str>,
        state: &mut LoopState,
        tried: &mut HashSet<String>,
    ) -> IterationReport {
        let iteration_start = Instant::now();
        let mut report = IterationReport::new(iteration);

        Self::transition(state, LoopState::Generating, iteration);
        let text = match previous {
            Some(text) => text.to_string(),
            None => match self.oracle.generate(description).await {
                Ok(raw) => {
                    let baseline = self.fixer.fix(&raw);
                    report
                        .fixes
                        .extend(baseline.descriptions().map(str::to_string));
                    baseline.corrected_text
                }
                Err(e) => {
                    report.error = Some(format!("Generation failed: {}", e));
                    report.duration = iteration_start.elapsed();
                    return report;
                }
            },
        };

        Self::transition(state, LoopState::Extracting, iteration);
        let references = references_in_namespace(&extract_references(&text), self.catalog.namespace());
        let names: Vec<&str> = references.iter().map(|r| r.name.as_str()).collect();

        Self::transition(state, LoopState::Validating, iteration);
        let batch = Validator::new(self.catalog).validate_many(&names);
        let validation = ValidationReport::from_batch(&batch, structural_warnings(&text));

        Self::transition(state, LoopState::Fixing, iteration);
        let fix = self.fixer.fix(&text);
        report.fixes.extend(fix.descriptions().map(str::to_string));
        report.validation = Some(validation.with_fixes(report.fixes.iter().map(String::as_str)));
        report.corrected_text = fix.corrected_text;

        Self::transition(state, LoopState::Rendering, iteration);
        tried.insert(text.clone());
        match render_and_publish(self.renderer, self.store, &text).await {
            Ok(locator) => report.render_locator = Some(locator),
            Err(e) => report.error = Some(format!("Render failed: {}", e)),
        }

        report.source_text = text;
        report.duration = iteration_start.elapsed();
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use df_core::NO_COMPONENTS_WARNING;
    use df_render::LocalBlobStore;

    use super::*;
    use crate::oracle::GenerationError;

    pub(crate) const VALID_SOURCE: &str = "from diagrams import Diagram\nfrom diagrams.azure.web import AppServices\nfrom diagrams.azure.database import SQLDatabases\n\nwith Diagram(\"Web\", show=False):\n    web = AppServices(\"web\")\n    db = SQLDatabases(\"db\")\n    web >> db\n";

    /// Oracle replaying canned responses, then repeating the last one.
    pub(crate) struct ScriptedOracle {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedOracle {
        pub(crate) fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::NoComponents))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Renderer failing according to a script, writing a file on success.
    pub(crate) struct ScriptedRenderer {
        failures: Mutex<VecDeque<bool>>,
        dir: PathBuf,
        pub(crate) rendered: Mutex<Vec<String>>,
    }

    impl ScriptedRenderer {
        /// `failures[i]` says whether call `i` fails; later calls succeed.
        pub(crate) fn new(dir: PathBuf, failures: Vec<bool>) -> Self {
            Self {
                failures: Mutex::new(failures.into()),
                dir,
                rendered: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.rendered.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Renderer for ScriptedRenderer {
        async fn render(&self, source: &str, artifact_id: &str) -> Result<PathBuf, RenderError> {
            self.rendered.lock().unwrap().push(source.to_string());
            let fail = self.failures.lock().unwrap().pop_front().unwrap_or(false);
            if fail {
                return Err(RenderError::Crashed("dot: command not found".to_string()));
            }
            let path = self.dir.join(format!("{}.png", artifact_id));
            std::fs::write(&path, b"png")?;
            Ok(path)
        }
    }

    fn report_with(score: u8, is_valid: bool) -> ValidationReport {
        ValidationReport {
            is_valid,
            score,
            total: 4,
            valid_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn test_config_presets() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.acceptance_score, 70);
        assert!(config.accept_zero_score);
        assert_eq!(config.loop_timeout, Duration::from_secs(120));
        assert_eq!(config.fallback_timeout, Duration::from_secs(30));

        assert_eq!(PipelineConfig::quick().max_iterations, 1);
        assert_eq!(PipelineConfig::thorough().max_iterations, 3);
    }

    #[test]
    fn test_acceptance_policy() {
        let lenient = PipelineConfig::default();
        assert!(lenient.accepts(&report_with(50, true)));
        assert!(lenient.accepts(&report_with(70, false)));
        assert!(!lenient.accepts(&report_with(69, false)));
        assert!(lenient.accepts(&report_with(0, false)));

        let strict = PipelineConfig::thorough();
        assert!(!strict.accepts(&report_with(0, false)));
        assert!(!strict.accepts(&report_with(80, false)));
        assert!(strict.accepts(&report_with(95, false)));
    }

    #[tokio::test]
    async fn test_zero_references_accepted() {
        let catalog = Catalog::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new(vec![Ok("print('no components here')\n".to_string())]);
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![]);
        let store = LocalBlobStore::disabled();
        let config = PipelineConfig::default();

        let outcome = GenerationLoop::new(&catalog, &oracle, &renderer, &store, &config)
            .run("anything")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.iteration_count, 1);
        let validation = outcome.validation.unwrap();
        assert_eq!(validation.score, 100);
        assert!(validation.is_valid);
        assert!(validation.warnings.iter().any(|w| w == NO_COMPONENTS_WARNING));
    }

    #[tokio::test]
    async fn test_render_failure_then_success() {
        let catalog = Catalog::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new(vec![Ok(VALID_SOURCE.to_string())]);
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![true]);
        let store = LocalBlobStore::disabled();
        let config = PipelineConfig::default();

        let outcome = GenerationLoop::new(&catalog, &oracle, &renderer, &store, &config)
            .run("web app with sql")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.iteration_count, 2);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

        let rendered = renderer.rendered.lock().unwrap().clone();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1], rendered[0]);
        assert_eq!(outcome.final_source_text, VALID_SOURCE);

        let locator = outcome.render_locator.unwrap();
        assert!(std::path::Path::new(&locator).exists());
    }

    #[tokio::test]
    async fn test_baseline_fix_before_render() {
        let catalog = Catalog::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let messy = "from diagrams import Diagram\nfrom diagrams.azure.security import KeyVault\n\nwith Diagram(\"Vault\"):\n    kv = KeyVault(\"kv\")\n";
        let oracle = ScriptedOracle::new(vec![Ok(messy.to_string())]);
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![]);
        let store = LocalBlobStore::disabled();
        let config = PipelineConfig::default();

        let outcome = GenerationLoop::new(&catalog, &oracle, &renderer, &store, &config)
            .run("vault")
            .await;

        assert!(outcome.success);
        assert!(outcome.final_source_text.contains("KeyVaults(\"kv\")"));
        assert!(outcome.final_source_text.contains("show=False"));
        let last = outcome.last.unwrap();
        assert!(last.fixes.contains(&"Corrected 'KeyVault' to 'KeyVaults'".to_string()));
        let validation = outcome.validation.unwrap();
        assert_eq!(validation.score, 100);
        assert!(validation
            .suggestions
            .iter()
            .any(|s| s == "Applied fix: Corrected 'KeyVault' to 'KeyVaults'"));
    }

    #[tokio::test]
    async fn test_oracle_error_is_retried() {
        let catalog = Catalog::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new(vec![
            Err(GenerationError::NoCodeInResponse("I can't".to_string())),
            Ok(VALID_SOURCE.to_string()),
        ]);
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![]);
        let store = LocalBlobStore::disabled();
        let config = PipelineConfig::default();

        let outcome = GenerationLoop::new(&catalog, &oracle, &renderer, &store, &config)
            .run("web")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.iteration_count, 2);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_iterations_fail() {
        let catalog = Catalog::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new(vec![Ok(VALID_SOURCE.to_string())]);
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![true, true, true]);
        let store = LocalBlobStore::disabled();
        let config = PipelineConfig::default();

        let outcome = GenerationLoop::new(&catalog, &oracle, &renderer, &store, &config)
            .run("web")
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.iteration_count, 2);
        assert!(outcome.render_locator.is_none());
        // Corrected text equals what was already tried, so no extra render.
        assert_eq!(renderer.calls(), 2);

        let error = outcome.error.unwrap();
        assert!(error.starts_with("Max iterations reached. Last error: Render failed"));
        assert_eq!(outcome.final_source_text, VALID_SOURCE);
        assert!(outcome.validation.is_some());
        assert_eq!(outcome.best.unwrap().iteration, 1);
        assert_eq!(outcome.last.unwrap().iteration, 2);
    }

    #[tokio::test]
    async fn test_oracle_never_answers() {
        let catalog = Catalog::builtin().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let oracle = ScriptedOracle::new(vec![]);
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![]);
        let store = LocalBlobStore::disabled();
        let config = PipelineConfig::default();

        let outcome = GenerationLoop::new(&catalog, &oracle, &renderer, &store, &config)
            .run("zzz")
            .await;

        assert!(!outcome.success);
        assert_eq!(renderer.calls(), 0);
        assert!(outcome.validation.is_none());
        assert!(outcome.error.clone().unwrap().contains("Generation failed"));
        assert!(outcome.final_source_text.is_empty());
        assert!(outcome.format_summary().starts_with("[FAILED]"));
    }

    #[tokio::test]
    async fn test_publish_uses_store_locator() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ScriptedRenderer::new(dir.path().to_path_buf(), vec![]);
        let store = LocalBlobStore::new(dir.path().join("public"), "/static/diagrams");

        let locator = render_and_publish(&renderer, &store, VALID_SOURCE).await.unwrap();
        assert!(locator.starts_with("/static/diagrams/"));
        assert!(locator.ends_with(".png"));
    }
}
