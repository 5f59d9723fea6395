//! # df-render
//!
//! Rendering and publication of diagram artifacts.
//!
//! | Contract | Implementation | Output |
//! |----------|----------------|--------|
//! | [`Renderer`] | [`PythonRenderer`] | `<output_dir>/<artifact_id>.png` |
//! | [`BlobStore`] | [`LocalBlobStore`] | `<url_prefix>/<file>` or `None` |
//!
//! Render failures are classified from the interpreter's stderr so callers
//! can tell a bad component reference ([`RenderError::is_bad_reference`])
//! from a broken renderer environment.

pub mod error;
pub mod python;
pub mod renderer;
pub mod store;

pub use error::{classify_failure, RenderError, StoreError};
pub use python::PythonRenderer;
pub use renderer::{is_valid_artifact_id, new_artifact_id, RenderConfig, Renderer};
pub use store::{BlobStore, LocalBlobStore};
