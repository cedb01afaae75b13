//! Logging setup for the relay daemon and its one-shot commands.
//!
//! The configured level applies to this crate only. Everything else logs
//! at `warn` unless `RUST_LOG` says otherwise; a `RUST_LOG` directive for a
//! target replaces the default one for that target.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Target of every event emitted by this crate.
pub const CRATE_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Level for targets outside this crate.
const OTHER_TARGETS_LEVEL: Level = Level::WARN;

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Target a directive applies to; empty for a bare level.
fn directive_target(directive: &str) -> &str {
    match directive.split_once('=') {
        Some((target, _)) => target.split('[').next().unwrap_or(target).trim(),
        None if directive.parse::<Level>().is_ok() || directive.eq_ignore_ascii_case("off") => "",
        None => directive.trim(),
    }
}

/// Filter directives for `level`, overlaid with `overrides` (`RUST_LOG` syntax).
pub fn filter_directives(level: &str, overrides: Option<&str>) -> Vec<String> {
    let mut directives = vec![
        OTHER_TARGETS_LEVEL.as_str().to_lowercase(),
        format!(
            "{}={}",
            CRATE_TARGET,
            parse_level(level).as_str().to_lowercase()
        ),
    ];

    for directive in overrides
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        let target = directive_target(directive);
        directives.retain(|d| directive_target(d) != target);
        directives.push(directive.to_string());
    }
    directives
}

fn build_filter(level: &str) -> EnvFilter {
    let overrides = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    EnvFilter::builder().parse_lossy(filter_directives(level, overrides.as_deref()).join(","))
}

/// Open the log file for appending, creating it and its directory.
///
/// The daemon and one-shot commands share the file, so it is never truncated.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Log to stdout and the configured file. Used by the queue daemon.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let log_file = Arc::new(open_log_file(Path::new(&config.file))?);
    let writer = std::io::stdout.and(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(false),
        )
        .with(build_filter(&config.level))
        .init();

    Ok(())
}

/// Compact logging to stderr, leaving stdout to command output.
pub fn init_stderr(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(build_filter(level))
        .init();
}
