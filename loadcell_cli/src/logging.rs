//! tracing setup: console layer (pretty or JSON) plus an optional JSON-lines file.

use eyre::WrapErr;
use loadcell_config::Logging;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::FILE_GUARD;

/// `RUST_LOG` wins over `--log-level`, which wins over `[logging].level`.
fn console_filter(cli_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli_level))
}

pub fn init(cli_level: &str, json: bool, cfg: &Logging) -> eyre::Result<()> {
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter(cli_level))
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(console_filter(cli_level))
            .boxed()
    };

    let file = match cfg.file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let appender = match cfg.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let level = cfg.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(level))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
