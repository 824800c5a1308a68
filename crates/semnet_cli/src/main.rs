//! SemNet CLI
//!
//! Command-line tools for SemNet knowledge bases.
//!
//! # Commands
//!
//! - `inspect` - Display dump metadata and element counts
//! - `verify` - Check file checksums and graph structure
//! - `dump` - List elements with their arcs and content
//! - `find` - Find links by content

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SemNet knowledge-base tools.
#[derive(Parser)]
#[command(name = "semnet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the knowledge-base directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display dump metadata and element counts
    Inspect {
        /// Show per-segment slot usage
        #[arg(short, long)]
        segments: bool,

        /// Show keynode bindings
        #[arg(short, long)]
        keynodes: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check file checksums and graph structure
    Verify {
        /// Decode every file and check its checksums
        #[arg(short, long)]
        files: bool,

        /// Load the graph and check arc lists
        #[arg(short, long)]
        graph: bool,

        /// Check all (default if no flags specified)
        #[arg(short, long)]
        all: bool,
    },

    /// List elements with their arcs and content
    Dump {
        /// Maximum number of elements to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Find links whose content equals the given text
    Find {
        /// Content to look for
        content: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            segments,
            keynodes,
            format,
        } => {
            let path = cli.path.ok_or("Knowledge-base path required for inspect")?;
            commands::inspect::run(&path, segments, keynodes, &format)?;
        }
        Commands::Verify { files, graph, all } => {
            let path = cli.path.ok_or("Knowledge-base path required for verify")?;
            let check_all = all || (!files && !graph);
            commands::verify::run(&path, files || check_all, graph || check_all)?;
        }
        Commands::Dump { limit, format } => {
            let path = cli.path.ok_or("Knowledge-base path required for dump")?;
            commands::dump::run(&path, limit, &format)?;
        }
        Commands::Find { content } => {
            let path = cli.path.ok_or("Knowledge-base path required for find")?;
            commands::find::run(&path, &content)?;
        }
        Commands::Version => {
            println!("SemNet CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SemNet Core v{}", semnet_core::VERSION);
            println!("Dump format v{}", semnet_core::persist::FORMAT_VERSION);
        }
    }

    Ok(())
}
