//! CLI entry point for Pipeflow.
//!
//! Wires the catalog, registry, synthesizer, and engine together once at
//! startup and dispatches subcommands.  `pipeflow run` streams NDJSON events
//! to stdout; `pipeflow tools` lists the registry.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pipeflow_catalog::{Database, ToolCatalog};
use pipeflow_engine::{Engine, EngineConfig, EventStreamer};
use pipeflow_registry::{Provenance, RemoteBackend, Synthesizer, ToolRegistry, builtin_tools};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing).
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Commands::Run { text, sync } => cmd_run(text, sync).await,
        cli::Commands::Tools => cmd_tools().await,
    }
}

/// Initialize tracing with an env-filter; events go to stderr so stdout
/// stays a clean NDJSON stream.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the full engine graph from configuration.
async fn build_engine(config: EngineConfig) -> Result<Arc<Engine>> {
    let catalog_path = std::path::Path::new(&config.catalog_url);
    if let Some(parent) = catalog_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create catalog directory")?;
        }
    }

    let db = Database::open(catalog_path).context("failed to open catalog database")?;
    let catalog = ToolCatalog::new(db)
        .await
        .context("failed to initialize catalog schema")?;

    let mut registry = ToolRegistry::new().with_catalog(catalog);
    if let Some(dir) = &config.static_dir {
        registry = registry.with_static_dir(dir.clone());
    }
    let registry = Arc::new(registry);

    let builtins = builtin_tools();
    let builtin_count = builtins.len();
    for tool in builtins {
        registry.register(tool, Provenance::BuiltIn);
    }
    let discovered = registry.load_catalog().await?;
    info!(builtin = builtin_count, discovered, "registry ready");

    let synthesizer = match (&config.synth_model, &config.synth_api_key) {
        (Some(model), Some(key)) => {
            info!(model = %model, "using remote synthesis back-end");
            Synthesizer::with_backend(Box::new(RemoteBackend::new(
                model.clone(),
                key.clone(),
                config.synth_api_base.clone(),
            )))
        }
        _ => Synthesizer::template(),
    };

    Ok(Arc::new(Engine::new(registry, synthesizer, config)))
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(text: String, sync: bool) -> Result<()> {
    init_tracing("warn");

    let config = EngineConfig::from_env();
    let engine = build_engine(config).await?;

    if sync {
        let result = engine.run_task_sync(&text, None).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let (rx, _cancel) = engine.run_task(text, None);
    let mut stdout = tokio::io::stdout();
    EventStreamer::stream(rx, &mut stdout)
        .await
        .context("failed to write event stream")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

async fn cmd_tools() -> Result<()> {
    init_tracing("warn");

    let config = EngineConfig::from_env();
    let engine = build_engine(config).await?;

    let mut tools = engine.registry().list();
    tools.sort_by(|a, b| a.name.cmp(&b.name));

    for tool in tools {
        let params = tool
            .schema
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<24} [{}] ({params}) {}",
            tool.name,
            tool.provenance.as_str(),
            tool.description
        );
    }

    Ok(())
}
