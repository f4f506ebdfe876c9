//! Bucketer CLI - assigns free-text titles to semantic buckets.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod output;

use commands::{ClassifyCommand, ListCommand, ShowCommand};

/// Bucketer CLI - incremental, unsupervised bucketing of job titles.
///
/// Each title is embedded and either joins the most similar existing bucket
/// or founds a new one. Buckets live in a local redb file or in a JSON file
/// committed to a GitHub repository.
///
/// Configuration is read from ~/.tzun/bucketer/config.yaml when present.
#[derive(Parser)]
#[command(name = "bucketer")]
#[command(about = "Incremental semantic bucketing of job titles")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.tzun/bucketer/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify titles into buckets
    Classify(ClassifyCommand),
    /// List buckets in creation order
    List(ListCommand),
    /// Show a single bucket
    Show(ShowCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results only.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Classify(cmd) => cmd.run(&cli).await,
        Commands::List(cmd) => cmd.run(&cli).await,
        Commands::Show(cmd) => cmd.run(&cli).await,
    }
}
