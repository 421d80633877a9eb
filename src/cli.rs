use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tp_core::ErrorKind;

#[derive(Parser)]
#[command(name = "tunepipe")]
#[command(author, version, about = "Streams YouTube audio as mp3 downloads")]
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
    /// Start the HTTP server
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the title and duration yt-dlp reports for a video
    Probe {
        /// Video URL
        #[arg(required = true)]
        url: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent rows from the audit log
    Logs {
        /// Show failed downloads instead of successful ones
        #[arg(long)]
        errors: bool,

        /// Only show failures of this kind (implies --errors)
        #[arg(long)]
        kind: Option<ErrorKind>,

        /// Number of rows to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,

        /// Number of newest rows to skip
        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
