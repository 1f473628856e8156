//! `loadcell`: read, tare, calibrate and weigh HX711 load cells.

mod backend;
mod cli;
mod commands;
mod error_fmt;
mod logging;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, DEFAULT_CONFIG, JSON_MODE};
use crate::commands::Ctx;
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

/// A missing file at the default path means built-in defaults; an explicit path must exist.
fn load_config(path: &Path) -> eyre::Result<loadcell_config::Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        let cfg = loadcell_config::Config::default();
        cfg.validate().wrap_err("default config")?;
        return Ok(cfg);
    }
    loadcell_config::load_file(path)
}

fn run(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    logging::init(&cli.log_level, cli.json, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), channels = cfg.channels.len(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
        }
    }

    let ctx = Ctx {
        cfg: &cfg,
        json: cli.json,
        shutdown,
    };
    commands::run(&ctx, &cli.cmd)
}

fn main() {
    let cli = Cli::parse();
    let _ = color_eyre::install();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(&cli) {
        tracing::debug!(error = ?err, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            println!("{}", humanize(&err));
        }
        eprintln!("error: {err:#}");
        std::process::exit(exit_code_for_error(&err));
    }
}
