//! CLI for generating, validating and repairing diagram source.
//!
//! # Usage
//!
//! ```bash
//! # Generate with the model
//! cargo run -p df-generator --bin df-generate -- generate "React SPA, Python API, Postgres, Redis"
//!
//! # Generate without network access
//! cargo run -p df-generator --bin df-generate -- generate --offline "web app with redis cache"
//!
//! # Check component names
//! cargo run -p df-generator --bin df-generate -- validate KeyVault AppServices Kafka
//!
//! # Repair a source file in place
//! cargo run -p df-generator --bin df-generate -- fix diagram.py --output diagram.py
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use df_core::Catalog;
use df_generator::{CatalogOracle, ClaudeOracle, DiagramService, Oracle, PipelineConfig};
use df_render::{BlobStore, LocalBlobStore, PythonRenderer, RenderConfig};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "df-generate", version, about = "Generate validated cloud architecture diagrams")]
struct Cli {
    /// Component catalog file (default: built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, validate, repair and render a diagram
    Generate {
        /// Architecture description
        description: String,
        /// Compose source from catalog keyword matches instead of the model
        #[arg(long)]
        offline: bool,
        /// Maximum loop iterations
        #[arg(short = 'n', long)]
        max_iterations: Option<u32>,
        /// Directory receiving rendered images
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Interpreter with the diagrams package installed
        #[arg(long, default_value = "python3")]
        python: String,
        /// Publish images into this directory
        #[arg(long)]
        public_dir: Option<PathBuf>,
        /// URL prefix of the public directory
        #[arg(long, default_value = "/static/diagrams")]
        url_prefix: String,
        /// Quick mode (one iteration, short timeouts)
        #[arg(long, conflicts_with = "thorough")]
        quick: bool,
        /// Thorough mode (more iterations, strict acceptance)
        #[arg(long)]
        thorough: bool,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate component names against the catalog
    Validate {
        #[arg(required = true)]
        names: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Suggest components for a description
    Suggest {
        description: String,
        /// Also print composed diagram source
        #[arg(long)]
        compose: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run the auto-fixer over a source file
    Fix {
        file: PathBuf,
        /// Write the corrected source here (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "df_generator=warn" } else { "df_generator=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_file(path),
        None => Catalog::builtin(),
    };
    let catalog = match catalog {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("Error loading catalog: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(components = catalog.len(), version = catalog.version(), "catalog loaded");

    match cli.command {
        Command::Generate {
            description,
            offline,
            max_iterations,
            output_dir,
            python,
            public_dir,
            url_prefix,
            quick,
            thorough,
            json,
        } => {
            let mut config = if quick {
                PipelineConfig::quick()
            } else if thorough {
                PipelineConfig::thorough()
            } else {
                PipelineConfig::default()
            };
            if let Some(max) = max_iterations {
                config.max_iterations = max.max(1);
            }

            let oracle: Arc<dyn Oracle> = if offline {
                Arc::new(CatalogOracle::new(catalog.clone()))
            } else {
                match ClaudeOracle::from_env(catalog.clone()) {
                    Ok(oracle) => Arc::new(oracle),
                    Err(e) => {
                        eprintln!("Error creating oracle: {}", e);
                        eprintln!();
                        eprintln!("Make sure ANTHROPIC_API_KEY is set, or pass --offline:");
                        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
                        return ExitCode::FAILURE;
                    }
                }
            };

            let mut render_config = RenderConfig {
                python,
                ..Default::default()
            };
            if let Some(dir) = output_dir {
                render_config.output_dir = dir;
            }
            let store: Arc<dyn BlobStore> = match public_dir {
                Some(dir) => Arc::new(LocalBlobStore::new(dir, url_prefix)),
                None => Arc::new(LocalBlobStore::disabled()),
            };
            let service = DiagramService::new(
                catalog,
                oracle,
                Arc::new(PythonRenderer::new(render_config)),
                store,
                config,
            );

            if !cli.quiet && !json {
                println!("Diagram Generator");
                println!("=================");
                println!();
                println!("Description: {}", description);
                println!("Max iterations: {}", service.config().max_iterations);
                println!();
            }

            match service.generate_and_validate(&description).await {
                Ok(outcome) => {
                    if json {
                        if let Err(code) = print_json(&outcome) {
                            return code;
                        }
                    } else {
                        println!("{}", outcome.format_summary());
                        println!("Source:");
                        println!("=======");
                        println!();
                        println!("{}", outcome.final_source_text);
                    }
                    if outcome.success {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }

        Command::Validate { names, json } => {
            let service = offline_service(catalog);
            let batch = service.validate_only(names.as_slice());
            if json {
                if let Err(code) = print_json(&batch) {
                    return code;
                }
            } else {
                for result in &batch.results {
                    if result.valid {
                        println!(
                            "  ok    {} ({})",
                            result.canonical.as_deref().unwrap_or(&result.requested),
                            result.import_path.as_deref().unwrap_or("?")
                        );
                    } else {
                        let hint = result
                            .best_suggestion()
                            .map(|s| format!(" -> try {} ({})", s.name, s.reason))
                            .unwrap_or_default();
                        println!("  error {}{}", result.requested, hint);
                    }
                }
                println!();
                println!("{}/{} valid", batch.valid_count, batch.total);
            }
            if batch.all_valid() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }

        Command::Suggest {
            description,
            compose,
            json,
        } => {
            let service = offline_service(catalog);
            let suggestions = service.suggest_for_description(&description);
            if json {
                if let Err(code) = print_json(&suggestions) {
                    return code;
                }
            } else {
                for s in &suggestions {
                    println!("  {:<16} {:<32} ({}, matched '{}')", s.pattern, s.canonical_name, s.module_group, s.keyword);
                }
            }
            if suggestions.is_empty() {
                eprintln!("No suitable components found for the given description");
                return ExitCode::FAILURE;
            }
            if compose {
                match service.compose_source(&description, None) {
                    Ok(source) => {
                        println!();
                        println!("{}", source);
                    }
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }

        Command::Fix { file, output, json } => {
            let source = match std::fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    eprintln!("Failed to read {}: {}", file.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            let service = offline_service(catalog);
            let result = service.fix_source(&source);
            let report = service
                .validate_source(&result.corrected_text)
                .with_fixes(result.descriptions());

            if json {
                #[derive(Serialize)]
                struct FixOutput<'a> {
                    fix: &'a df_repair::FixResult,
                    report: &'a df_core::ValidationReport,
                }
                if let Err(code) = print_json(&FixOutput {
                    fix: &result,
                    report: &report,
                }) {
                    return code;
                }
            } else {
                eprintln!("{}", report.format_report());
            }

            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, &result.corrected_text) {
                        eprintln!("Failed to write output: {}", e);
                        return ExitCode::FAILURE;
                    }
                    eprintln!("Corrected source written to: {}", path.display());
                }
                None if !json => print!("{}", result.corrected_text),
                None => {}
            }

            if report.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Service for commands that never call the oracle or the renderer.
fn offline_service(catalog: Arc<Catalog>) -> DiagramService {
    DiagramService::new(
        catalog.clone(),
        Arc::new(CatalogOracle::new(catalog)),
        Arc::new(PythonRenderer::new(RenderConfig::default())),
        Arc::new(LocalBlobStore::disabled()),
        PipelineConfig::default(),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ExitCode> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to serialize output: {}", e);
            Err(ExitCode::FAILURE)
        }
    }
}
