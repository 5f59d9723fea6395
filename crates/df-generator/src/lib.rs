//! # df-generator
//!
//! Natural-language description in, rendered and validated diagram out.
//!
//! # Usage
//!
//! ```bash
//! # Generate with the model
//! ANTHROPIC_API_KEY=sk-... cargo run -p df-generator -- generate "React SPA with a Python API and Postgres"
//!
//! # Generate offline from catalog keyword matches
//! cargo run -p df-generator -- generate --offline "web app with redis cache"
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Description │ ──> │   Oracle    │ ──> │  Baseline   │
//! │             │     │ (Claude or  │     │    Fix      │
//! └─────────────┘     │  catalog)   │     └──────┬──────┘
//!                     └─────────────┘            │
//!                     ┌──────────────────────────┘
//!                     ▼
//!              ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!              │  Validate   │ ──> │   AutoFix   │ ──> │   Render    │
//!              │  (score)    │     │             │     │  + Publish  │
//!              └─────────────┘     └─────────────┘     └──────┬──────┘
//!                     ▲                                       │
//!                     │        (not accepted, under cap)      │
//!                     └───────────── corrected text ──────────┘
//! ```
//!
//! The whole loop runs under a wall-clock timeout. On timeout a single fast
//! attempt (oracle then render) replaces it.

pub mod client;
pub mod oracle;
pub mod pipeline;
pub mod prompt;
pub mod service;

pub use client::{ClaudeClient, ClaudeConfig, ClientError, Message, MessagesResponse, Role};
pub use oracle::{CatalogOracle, ClaudeOracle, GenerationError, Oracle};
pub use pipeline::{
    render_and_publish, validate_source, GenerationLoop, GenerationOutcome, IterationReport, LoopState, PipelineConfig,
};
pub use prompt::{extract_code_block, PromptBuilder};
pub use service::{DiagramService, ServiceError};
