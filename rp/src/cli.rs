//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rp - request pool toolkit
#[derive(Parser)]
#[command(
    name = "rp",
    about = "Inspect and exercise bounded-concurrency request pools",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/reqpool/logs/rp.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (overrides config)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Show built-in and configured pool settings
    Presets {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Drive synthetic upload and API traffic through the pools
    Simulate {
        /// How long to generate traffic, in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Submissions per second across all traffic kinds
        #[arg(short, long, default_value = "40")]
        rate: u32,

        /// Fraction of operations that fail (0.0 - 1.0)
        #[arg(long, default_value = "0.05")]
        failure_rate: f64,

        /// Seed for reproducible traffic
        #[arg(long)]
        seed: Option<u64>,

        /// Milliseconds between status lines
        #[arg(long, default_value = "500")]
        report_interval_ms: u64,

        /// Output format for the final statistics
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for presets/statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" | "table" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(format!("Unknown format: {}. Use: text, json, or yaml", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}
