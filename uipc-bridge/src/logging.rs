//! Tracing subscriber setup.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;

/// Where log lines end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    Stderr,
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
///
/// Falls back to stderr when the log file is unset or cannot be opened.
pub fn init(config: &BridgeConfig) -> LogTarget {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    match open_log_file(&config.log_file) {
        Some((file, path)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            LogTarget::File(path)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            LogTarget::Stderr
        }
    }
}

fn open_log_file(name: &str) -> Option<(File, PathBuf)> {
    if name.trim().is_empty() {
        return None;
    }
    let path = PathBuf::from(name);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some((file, path)),
        Err(e) => {
            eprintln!("cannot open log file {}: {e}; logging to stderr", path.display());
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
