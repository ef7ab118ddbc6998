//! # Shelf CLI (`shelf`)
//!
//! Command-line front end for the catalog synchronizer and writer.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf sync` | Reconcile the local cache with the remote catalog and folders |
//! | `shelf list` | Print the cached catalog, pinned first |
//! | `shelf show <id>` | Fetch a document and print its metadata and body |
//! | `shelf upload <file> --author <name>` | Upload a document and register it |
//! | `shelf replace <json>` | Overwrite the remote catalog |
//! | `shelf pin <id>` | Pin (or `--unpin`) a document |
//! | `shelf stats` | Summarize cache and access log |
//!
//! Logging goes through `tracing`; set `RUST_LOG=shelf_sync=debug` for
//! request-level detail.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use shelf_sync::config;
use shelf_sync::get;
use shelf_sync::progress::ProgressMode;
use shelf_sync::stats;
use shelf_sync::sync;
use shelf_sync::upload;

/// Shelf: catalog sync for a GitHub-backed document reader.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Shelf: catalog sync for a GitHub-backed document reader",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the catalog.
    ///
    /// Exposes a fresh local cache first, then merges the remote catalog
    /// file and a scan of the author folders. Network failures leave the
    /// cached view in place.
    Sync {
        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Print the cached catalog, pinned documents first.
    List,

    /// Fetch a document's content and print it.
    Show {
        /// Document id.
        id: String,

        /// Print the stored blob unchanged, metadata header included.
        #[arg(long)]
        raw: bool,
    },

    /// Upload an HTML document and add it to the catalog.
    Upload {
        /// Local HTML file.
        file: PathBuf,

        /// Author display name; the folder is its slug.
        #[arg(long)]
        author: String,

        /// Title; defaults to the file's metadata header, then its name.
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Overwrite the remote catalog with a JSON array of records.
    Replace {
        /// JSON file holding the new catalog.
        file: PathBuf,

        /// Also delete the blobs of records that were dropped.
        #[arg(long)]
        prune: bool,
    },

    /// Pin a document so it sorts first.
    Pin {
        /// Document id.
        id: String,

        /// Clear the flag instead.
        #[arg(long)]
        unpin: bool,
    },

    /// Show cache and access statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { progress } => {
            let mode = match progress {
                Some(ProgressArg::Off) => ProgressMode::Off,
                Some(ProgressArg::Human) => ProgressMode::Human,
                Some(ProgressArg::Json) => ProgressMode::Json,
                None => ProgressMode::default_for_tty(),
            };
            sync::run_sync(&cfg, mode).await?;
        }
        Commands::List => {
            sync::run_list(&cfg)?;
        }
        Commands::Show { id, raw } => {
            get::run_show(&cfg, &id, raw).await?;
        }
        Commands::Upload {
            file,
            author,
            title,
            description,
        } => {
            upload::run_upload(&cfg, &file, &author, title, description).await?;
        }
        Commands::Replace { file, prune } => {
            upload::run_replace(&cfg, &file, prune).await?;
        }
        Commands::Pin { id, unpin } => {
            upload::run_pin(&cfg, &id, !unpin).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
    }

    Ok(())
}
