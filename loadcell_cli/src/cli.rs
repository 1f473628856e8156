//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Default config location; a missing file at this path falls back to built-in defaults.
pub const DEFAULT_CONFIG: &str = "etc/loadcell.toml";

#[derive(Parser, Debug)]
#[command(name = "loadcell", version, about = "HX711 load-cell tool")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Emit JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print raw sign-extended counts
    Raw {
        /// Channel name or index
        #[arg(long, default_value = "0")]
        channel: String,
        /// Number of samples
        #[arg(long, default_value_t = 10)]
        count: u32,
    },
    /// Zero the channel and store the offset
    Tare {
        #[arg(long, default_value = "0")]
        channel: String,
        /// Batch size (defaults to the channel's tare_samples)
        #[arg(long)]
        samples: Option<i32>,
    },
    /// Tare, then derive counts-per-gram from a known weight and store both
    Calibrate {
        #[arg(long, default_value = "0")]
        channel: String,
        /// Known weight on the cell, in grams
        #[arg(long)]
        grams: f32,
        /// Batch size (defaults to the channel's calibrate_samples)
        #[arg(long)]
        samples: Option<i32>,
        /// Time between tare and calibration for placing the weight
        #[arg(long, value_name = "MS", default_value_t = 0)]
        place_ms: u64,
    },
    /// Stream weight through the rolling trimmed filter
    Weigh {
        #[arg(long, default_value = "0")]
        channel: String,
        /// Readings to print; 0 runs until interrupted
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Use the one-shot trimmed batch per reading instead of the rolling filter
        #[arg(long, action = ArgAction::SetTrue)]
        batch: bool,
    },
    /// Print the stored calibration record
    Show,
    /// Erase the stored calibration record
    EraseConfig,
}
