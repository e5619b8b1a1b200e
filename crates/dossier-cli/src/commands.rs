use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use dossier_catalog::{DocumentRegistry, SqliteCatalog};
use dossier_core::{reconcile_orphans, ReconcileOptions};
use dossier_server::{DossierServer, ServerConfig};
use dossier_staging::CleanupSweep;
use dossier_store::S3ObjectStore;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Sweep(args) => cmd_sweep(args, format).await,
        Command::Reconcile(args) => cmd_reconcile(args, format).await,
        Command::Config(args) => cmd_config(args, format),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ServerConfig> {
    ServerConfig::load(path).context("loading configuration")
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let server = DossierServer::new(config)
        .await
        .context("starting dossier server")?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
        trigger.cancel();
    });

    server.serve(shutdown).await?;
    Ok(())
}

async fn cmd_sweep(args: SweepArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let dir = args.dir.unwrap_or(config.staging.dir);
    let max_age = args
        .max_age
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.sweep.max_age());

    let report = CleanupSweep::new(&dir, max_age)
        .run_once()
        .await
        .with_context(|| format!("sweeping {}", dir.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "{} Swept {}: {} removed, {} kept, {} failed ({} bytes reclaimed)",
                "✓".green().bold(),
                dir.display().to_string().bold(),
                report.removed.to_string().green(),
                report.scanned - report.removed,
                report.failed,
                report.bytes_reclaimed,
            );
        }
    }
    Ok(())
}

async fn cmd_reconcile(args: ReconcileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let catalog = SqliteCatalog::connect(&config.catalog.url, config.catalog.max_connections)
        .await
        .with_context(|| format!("opening catalog {}", config.catalog.url))?;
    let registry = DocumentRegistry::new(Arc::new(catalog));
    let store = S3ObjectStore::new(&config.object_store);
    let options = ReconcileOptions {
        prefix: args.prefix,
        min_age: Duration::from_secs(args.min_age),
        delete: args.delete,
    };

    let report = reconcile_orphans(&store, &registry, &options)
        .await
        .context("reconciling object store against catalog")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for key in &report.orphans {
                println!("  {} {}", "orphan:".yellow(), key);
            }
            let verdict = if report.orphans.is_empty() {
                "✓".green().bold()
            } else {
                "!".yellow().bold()
            };
            println!(
                "{} Scanned {} objects in {}: {} orphaned, {} too recent, {} deleted, {} failed",
                verdict,
                report.scanned,
                config.object_store.bucket.bold(),
                report.orphans.len(),
                report.skipped_recent,
                report.deleted,
                report.failed,
            );
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?.redacted();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["dossier", "sweep", "--dir", "/tmp/stage", "--format", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Sweep(args) => {
                assert_eq!(args.dir.unwrap(), std::path::PathBuf::from("/tmp/stage"));
                assert!(args.max_age.is_none());
            }
            _ => panic!("expected sweep"),
        }
    }

    #[test]
    fn reconcile_defaults() {
        let cli = Cli::parse_from(["dossier", "reconcile"]);
        match cli.command {
            Command::Reconcile(args) => {
                assert!(!args.delete);
                assert_eq!(args.min_age, 900);
                assert!(args.prefix.is_empty());
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["dossier", "config", "--format", "yaml"]).is_err());
    }

    #[tokio::test]
    async fn sweep_command_runs_against_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("stg-0-abandoned"), b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let args = SweepArgs {
            dir: Some(tmp.path().to_path_buf()),
            max_age: Some(0),
            config: None,
        };
        cmd_sweep(args, OutputFormat::Json).await.unwrap();
        assert!(!tmp.path().join("stg-0-abandoned").exists());
    }
}
