use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dossier",
    about = "Accreditation document store: staging, commit, versioning and retrieval",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Remove stale staging files once
    Sweep(SweepArgs),
    /// Find stored objects no catalog version references
    Reconcile(ReconcileArgs),
    /// Print the effective configuration, secrets redacted
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct SweepArgs {
    /// Staging directory; defaults to the configured one
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Reclaim files older than this many seconds
    #[arg(long)]
    pub max_age: Option<u64>,
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReconcileArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Only examine keys under this prefix, e.g. `research/`
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// Skip objects issued less than this many seconds ago
    #[arg(long, default_value = "900")]
    pub min_age: u64,
    /// Delete the orphans instead of only listing them
    #[arg(long)]
    pub delete: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
