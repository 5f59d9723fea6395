//! Renderer contract.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RenderError;

/// Turns diagram source text into an image on local disk.
///
/// An implementation returns a path only after the artifact exists in its
/// final location, so a cancelled render never leaves a reported path
/// pointing at a partial file.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `source` and return the path of the produced artifact.
    async fn render(&self, source: &str, artifact_id: &str) -> Result<PathBuf, RenderError>;
}

/// Configuration for the subprocess renderer.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Interpreter used to execute the diagram source
    pub python: String,
    /// Directory receiving `<artifact_id>.png`
    pub output_dir: PathBuf,
    /// Timeout for one render
    pub timeout: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            output_dir: std::env::temp_dir().join("df-diagrams"),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RenderConfig {
    /// Short timeout for the fallback path.
    pub fn quick() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            ..Default::default()
        }
    }
}

/// Fresh random artifact id.
pub fn new_artifact_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Artifact ids become file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn is_valid_artifact_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_ids() {
        let id = new_artifact_id();
        assert_eq!(id.len(), 16);
        assert!(is_valid_artifact_id(&id));
        assert!(is_valid_artifact_id("diagram_1-a"));
        assert!(!is_valid_artifact_id(""));
        assert!(!is_valid_artifact_id("../etc/passwd"));
        assert!(!is_valid_artifact_id("a b"));
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(RenderConfig::default().python, "python3");
        assert!(RenderConfig::quick().timeout < RenderConfig::default().timeout);
    }
}
