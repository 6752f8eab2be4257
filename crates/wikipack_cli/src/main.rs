//! wikipack CLI
//!
//! Builds offline archives from MediaWiki XML exports and reads them back.
//!
//! # Commands
//!
//! - `build` - Convert a dump into an archive directory
//! - `lookup` - Print one page by id or title
//! - `inspect` - Display archive statistics
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::build::BuildArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline encyclopedia archive builder.
#[derive(Parser)]
#[command(name = "wikipack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a dump into an archive directory
    Build(BuildArgs),

    /// Print one page by id or title
    Lookup {
        /// Archive directory
        path: PathBuf,

        /// Page title, or numeric id with --id
        key: String,

        /// Treat the key as a page id
        #[arg(long)]
        id: bool,

        /// Follow redirects to the target page
        #[arg(short, long)]
        follow: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Display archive statistics
    Inspect {
        /// Archive directory
        path: PathBuf,

        /// Show per-segment sizes
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build(args) => {
            commands::build::run(&args)?;
        }
        Commands::Lookup {
            path,
            key,
            id,
            follow,
            format,
        } => {
            let key = if id {
                commands::lookup::Key::Id(key.parse().map_err(|_| format!("not a page id: {key}"))?)
            } else {
                commands::lookup::Key::Title(key)
            };
            commands::lookup::run(&path, &key, follow, &format)?;
        }
        Commands::Inspect {
            path,
            segments,
            format,
        } => {
            commands::inspect::run(&path, segments, &format)?;
        }
        Commands::Version => {
            println!("wikipack CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("wikipack core v{}", wikipack_core::VERSION);
        }
    }

    Ok(())
}
