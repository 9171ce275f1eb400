mod cli_defaults;
mod dispatch;
mod project_commands;
mod runtime_context;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use patchloop_config::ProviderSetting;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Auto,
    Ollama,
    Openai,
}

impl ProviderArg {
    fn as_setting(self) -> ProviderSetting {
        match self {
            ProviderArg::Auto => ProviderSetting::Auto,
            ProviderArg::Ollama => ProviderSetting::Ollama,
            ProviderArg::Openai => ProviderSetting::Openai,
        }
    }
}

/// Options shared by every command that talks to a model.
#[derive(Debug, clap::Args)]
struct ProviderArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,
    #[arg(long)]
    ollama_url: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    no_progress: bool,
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "patchloop",
    version,
    about = "Run a project, and let a model repair it until it works"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a project directory through the repair loop.
    Run {
        dir: PathBuf,
        #[command(flatten)]
        provider: ProviderArgs,
        /// Repair cycles allowed before giving up.
        #[arg(long)]
        max_retries: Option<usize>,
        /// Pause between a fix and the next attempt, in milliseconds.
        #[arg(long)]
        settle_ms: Option<u64>,
        /// Extra context forwarded with every fix request.
        #[arg(long)]
        hint: Option<String>,
        /// Write the repaired files back into DIR.
        #[arg(long, conflicts_with = "out")]
        write: bool,
        /// Write the repaired files beneath this directory.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the final session as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Run a project once without attempting repairs.
    Check {
        dir: PathBuf,
        #[command(flatten)]
        provider: ProviderArgs,
    },
    /// Evaluate inline JavaScript in the local engine.
    Eval { code: String },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("patchloop=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse_from(cli_defaults::normalize_cli_args(std::env::args_os()));
    dispatch::execute(cli)
}
