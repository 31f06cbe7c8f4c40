use clap::{Parser, Subcommand};
use sampledrain_media::InterleaveStrategy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sampledrain")]
#[command(author, version, about = "Drain finished MP4 containers sample by sample")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drain every sample of a finished container in interleaved order
    Drain {
        /// Container to drain
        #[arg(required = true)]
        file: PathBuf,

        /// Write each track's samples to a file in this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Keep the container after draining
        #[arg(long)]
        keep: bool,

        /// Interleave strategy (anchor or chronological)
        #[arg(long)]
        strategy: Option<InterleaveStrategy>,

        /// Print samples as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show the expanded sample tables of a container
    Inspect {
        /// Container to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch configured directories and drain containers as they finish
    Watch,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
