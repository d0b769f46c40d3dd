mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::info;

use vaultflow::config::default_settings_path;
use vaultflow::{init_tracing, load_settings, Vaultflow};

#[derive(Parser)]
#[clap(
    name = "vaultflow",
    version,
    about = "Route files in a notes vault through transcription and LLM steps"
)]
struct Cli {
    /// Settings file. Defaults to <config dir>/vaultflow/settings.yaml.
    #[clap(long, global = true)]
    settings: Option<PathBuf>,

    /// Print results as JSON on stdout.
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one file with the step whose input contains it
    Process {
        /// Vault-relative path of the file
        path: String,
    },
    /// Process the next waiting file
    Next,
    /// Process waiting files until none are left
    All {
        /// Stop after this many files
        #[clap(long)]
        max: Option<usize>,
        /// Abort the batch on the first error
        #[clap(long)]
        stop_on_error: bool,
    },
    /// Check the models and pipeline configuration
    Validate,
    /// Show entry points and waiting files per step
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .or_else(default_settings_path)
        .ok_or_else(|| anyhow!("no settings file given and no config directory available"))?;
    let settings = load_settings(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;

    init_tracing(&settings.logging.level, settings.logging.json);
    info!("Starting vaultflow v{}", env!("CARGO_PKG_VERSION"));

    let app = Vaultflow::from_settings(settings).context("failed to initialize vaultflow")?;

    let success = match cli.command {
        Commands::Validate => commands::validate(&app, cli.json),
        Commands::Status => {
            commands::ensure_valid(&app, cli.json) && commands::status(&app, cli.json).await?
        }
        Commands::Process { path } => {
            commands::ensure_valid(&app, cli.json) && commands::process(&app, &path, cli.json).await
        }
        Commands::Next => {
            commands::ensure_valid(&app, cli.json) && commands::next(&app, cli.json).await
        }
        Commands::All { max, stop_on_error } => {
            commands::ensure_valid(&app, cli.json)
                && commands::all(&app, max, stop_on_error, cli.json).await
        }
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
