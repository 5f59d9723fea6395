//! Subprocess renderer: runs the diagram source with a Python interpreter.
//!
//! Each render gets its own scratch directory. The produced image is copied
//! next to its final name and then renamed into place, so `render` only
//! returns once the artifact is complete.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{classify_failure, RenderError};
use crate::renderer::{is_valid_artifact_id, RenderConfig, Renderer};

const SCRIPT_NAME: &str = "diagram.py";
const ARTIFACT_EXTENSION: &str = "png";

/// Renderer backed by a local interpreter and the diagrams package.
#[derive(Debug, Clone)]
pub struct PythonRenderer {
    config: RenderConfig,
}

impl PythonRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    async fn render_in(&self, scratch: &Path, source: &str, artifact_id: &str) -> Result<PathBuf, RenderError> {
        tokio::fs::write(scratch.join(SCRIPT_NAME), source).await?;

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.config.timeout,
            Command::new(&self.config.python)
                .arg(SCRIPT_NAME)
                .current_dir(scratch)
                .kill_on_drop(true)
                .output(),
        )
        .await;
        let duration = start.elapsed();

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RenderError::Spawn {
                    program: self.config.python.clone(),
                    source: e,
                })
            }
            Err(_) => return Err(RenderError::Timeout(self.config.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let error = classify_failure(&stderr);
            tracing::debug!(artifact_id, ?duration, %error, "render failed");
            return Err(error);
        }

        let produced = find_artifact(scratch).await?.ok_or(RenderError::NoArtifact)?;

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let target = self
            .config
            .output_dir
            .join(format!("{}.{}", artifact_id, ARTIFACT_EXTENSION));
        let partial = self
            .config
            .output_dir
            .join(format!("{}.{}.part", artifact_id, ARTIFACT_EXTENSION));
        tokio::fs::copy(&produced, &partial).await?;
        tokio::fs::rename(&partial, &target).await?;

        tracing::debug!(artifact_id, ?duration, path = %target.display(), "render succeeded");
        Ok(target)
    }
}

/// First image the script produced, by file name.
async fn find_artifact(dir: &Path) -> Result<Option<PathBuf>, RenderError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == ARTIFACT_EXTENSION) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

#[async_trait]
impl Renderer for PythonRenderer {
    async fn render(&self, source: &str, artifact_id: &str) -> Result<PathBuf, RenderError> {
        if !is_valid_artifact_id(artifact_id) {
            return Err(RenderError::InvalidArtifactId(artifact_id.to_string()));
        }

        let scratch = std::env::temp_dir().join(format!("df-render-{}", rand::random::<u64>()));
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self.render_in(&scratch, source, artifact_id).await;

        // Cleanup
        let _ = tokio::fs::remove_dir_all(&scratch).await;

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Renderer that runs the source as a shell script.
    fn shell_renderer(output_dir: &Path, timeout: Duration) -> PythonRenderer {
        PythonRenderer::new(RenderConfig {
            python: "sh".to_string(),
            output_dir: output_dir.to_path_buf(),
            timeout,
        })
    }

    #[tokio::test]
    async fn test_render_moves_artifact() {
        let out = tempfile::tempdir().unwrap();
        let renderer = shell_renderer(out.path(), Duration::from_secs(10));

        let path = renderer
            .render("printf 'png' > web_app.png\n", "abc123")
            .await
            .unwrap();

        assert_eq!(path, out.path().join("abc123.png"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "png");
        assert!(!out.path().join("abc123.png.part").exists());
    }

    #[tokio::test]
    async fn test_render_classifies_failure() {
        let out = tempfile::tempdir().unwrap();
        let renderer = shell_renderer(out.path(), Duration::from_secs(10));

        let script = "echo \"ImportError: cannot import name 'Kafka' from 'diagrams.azure.integration'\" >&2\nexit 1\n";
        let error = renderer.render(script, "failing").await.unwrap_err();
        assert!(error.is_bad_reference());
        assert!(!out.path().join("failing.png").exists());
    }

    #[tokio::test]
    async fn test_render_without_image() {
        let out = tempfile::tempdir().unwrap();
        let renderer = shell_renderer(out.path(), Duration::from_secs(10));

        let error = renderer.render("true\n", "empty").await.unwrap_err();
        assert!(matches!(error, RenderError::NoArtifact));
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let out = tempfile::tempdir().unwrap();
        let renderer = shell_renderer(out.path(), Duration::from_millis(200));

        let error = renderer.render("sleep 5\n", "slow").await.unwrap_err();
        assert!(matches!(error, RenderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_render_rejects_bad_id_and_missing_interpreter() {
        let out = tempfile::tempdir().unwrap();
        let renderer = shell_renderer(out.path(), Duration::from_secs(10));
        let error = renderer.render("true\n", "../escape").await.unwrap_err();
        assert!(matches!(error, RenderError::InvalidArtifactId(_)));

        let renderer = PythonRenderer::new(RenderConfig {
            python: "df-no-such-interpreter".to_string(),
            output_dir: out.path().to_path_buf(),
            timeout: Duration::from_secs(10),
        });
        let error = renderer.render("true\n", "x").await.unwrap_err();
        assert!(matches!(error, RenderError::Spawn { .. }));
    }
}
