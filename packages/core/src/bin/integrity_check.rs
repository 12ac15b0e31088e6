//! Relationship Integrity Check
//!
//! Validates or repairs the references of one project against whichever
//! back-end the deployment is configured for, printing the JSON report.
//!
//! # Usage
//!
//! ```bash
//! # Self-hosted deployment
//! DATABASE_URL=file:/var/lib/recordspace/records.db integrity-check validate P1
//!
//! # Document store on disk
//! integrity-check --mode document --document-path ./data/records repair P1
//! ```
//!
//! # Environment Variables
//!
//! - `DEPLOYMENT_MODE`: `document`/`firebase` or `self-hosted`/`relational`
//! - `DATABASE_URL`: relational database file (`file:`, `sqlite:` or a path)
//! - `RUST_LOG`: log filter (default `info`); logs go to stderr
//!
//! Document mode requires `--document-path`: an in-memory store would start
//! empty and every project would report as missing.
//!
//! Exits with status 1 when validation finds errors or repair fails a write.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use recordspace_core::db::{AdapterFactory, FactoryConfig, DATABASE_URL_ENV, DEPLOYMENT_MODE_ENV};
use recordspace_core::{DatabaseAdapter, DeploymentMode, RelationshipService};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "integrity-check", version, about = "Validate and repair record relationships")]
struct Cli {
    /// Deployment mode (overrides automatic selection)
    #[arg(long, env = DEPLOYMENT_MODE_ENV)]
    mode: Option<String>,

    /// Relational database location
    #[arg(long, env = DATABASE_URL_ENV)]
    database_url: Option<String>,

    /// On-disk document store directory (required in document mode)
    #[arg(long)]
    document_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report dangling and missing references
    Validate { project_id: String },
    /// Null dangling references and prune dangling array entries
    Repair { project_id: String },
    /// Print the project's relationship graph
    Graph { project_id: String },
}

/// Factory for the selected deployment
///
/// # Errors
///
/// Fails when the document store is selected without `--document-path`.
fn build_factory(
    mode: Option<String>,
    database_url: Option<String>,
    document_path: Option<PathBuf>,
) -> anyhow::Result<AdapterFactory> {
    let mut config = FactoryConfig::from_vars(mode, database_url);
    if let Some(path) = document_path {
        config = config.with_document_path(path);
    }
    let factory = AdapterFactory::new(config);
    if factory.mode() == DeploymentMode::DocumentStore && factory.config().document_path.is_none() {
        anyhow::bail!(
            "{} mode needs --document-path; an in-memory store holds no projects to check",
            factory.mode()
        );
    }
    Ok(factory)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let factory = build_factory(cli.mode, cli.database_url, cli.document_path)?;
    let adapter = factory
        .adapter()
        .await
        .with_context(|| format!("Failed to open {} database", factory.mode()))?;
    let service = RelationshipService::new(adapter.clone());

    let ok = match cli.command {
        Command::Validate { project_id } => {
            let report = service
                .validate_relationships(&project_id)
                .await
                .with_context(|| format!("Failed to validate project {}", project_id))?;
            print_json(&report)?;
            report.valid
        }
        Command::Repair { project_id } => {
            let report = service
                .repair_relationships(&project_id)
                .await
                .with_context(|| format!("Failed to repair project {}", project_id))?;
            print_json(&report)?;
            report.errors.is_empty()
        }
        Command::Graph { project_id } => {
            let graph = service
                .get_project_relationship_graph(&project_id)
                .await
                .with_context(|| format!("Failed to load project {}", project_id))?
                .with_context(|| format!("Project {} not found", project_id))?;
            print_json(&graph)?;
            true
        }
    };

    adapter
        .disconnect()
        .await
        .context("Failed to close database")?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
