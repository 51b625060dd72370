//! atelier-autosave - replay field edits against the autosave core

#![allow(missing_docs)]

mod config;
mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "atelier-autosave", version, about = "Atelier field autosave simulator")]
struct Cli {
    /// Autosave config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the debounce interval
    #[arg(long, global = true)]
    debounce_ms: Option<u64>,

    /// Editor id stamped on every write
    #[arg(long, global = true)]
    updated_by: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay an edit script and print the final document and field statuses
    Simulate {
        /// Edit script (JSON)
        #[arg(long)]
        script: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let overrides = config::Overrides {
        debounce_ms: cli.debounce_ms,
        updated_by: cli.updated_by.clone(),
    };
    let config = config::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Command::Simulate { script: path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading script {}", path.display()))?;
            let parsed: script::Script = serde_json::from_str(&raw)
                .with_context(|| format!("parsing script {}", path.display()))?;
            tracing::info!(
                steps = parsed.steps.len(),
                debounce_ms = config.debounce_ms,
                "replaying edit script"
            );

            let outcome = script::run(parsed, config).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
            if outcome.unsaved {
                std::process::exit(2);
            }
        }
        Command::Config => {
            print!("{}", config::render(&config)?);
        }
    }
    Ok(())
}
