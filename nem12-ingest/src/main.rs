use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use nem12_ingest::{
    config::AppConfig,
    load::load_files,
    metrics_export,
    nem12::{parse_files, write_merged_files},
    observability,
    sinks::JsonDocumentStore,
};

/// Merge NEM12 meter data files and load daily usage into the document store.
#[derive(Debug, Parser)]
#[command(name = "nem12-ingest", version)]
struct Cli {
    /// Config file (defaults to $NEM12_INGEST_CONFIG, then ./nem12-config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge fragments into one `nem12_<nmi>.csv` per NMI.
    Merge {
        /// Output directory (overrides `merge.output_dir`).
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Load daily usage, one independent session per file.
    Load {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let cfg = AppConfig::load(cli.config.as_deref())?;
    if cfg.metrics.is_some() {
        metrics_export::init()?;
    }

    let result = match cli.command {
        Command::Merge { out, files } => {
            let out = out.unwrap_or_else(|| cfg.merge.output_dir.clone());
            merge(files, out).await
        }
        Command::Load { files } => load(&cfg, files).await,
    };

    if let Some(metrics_cfg) = &cfg.metrics {
        if let Err(e) = metrics_export::write_textfile(&metrics_cfg.textfile_path) {
            tracing::error!(error = %e, "failed to write metrics textfile");
        }
    }

    result
}

async fn merge(files: Vec<PathBuf>, out: PathBuf) -> Result<()> {
    let written = tokio::task::spawn_blocking(move || {
        let session = parse_files(&files)?;
        write_merged_files(&session, &out)
    })
    .await??;

    tracing::info!(files = written.len(), "merge complete");
    Ok(())
}

async fn load(cfg: &AppConfig, files: Vec<PathBuf>) -> Result<()> {
    let store = JsonDocumentStore::new(&cfg.store.root_dir, cfg.store.collection.clone());
    let total = files.len();

    let report = load_files(cfg, store, files).await;
    if report.failed > 0 {
        bail!("{} of {total} files failed to load", report.failed);
    }
    Ok(())
}
