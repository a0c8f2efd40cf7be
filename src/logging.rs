//! Tracing subscriber setup.
//!
//! Logs go to stderr by default. With a `log_dir` configured they go to
//! `logging.file_name` in that directory instead. Earlier files are shifted
//! to `.1`, `.2`, … on every start, keeping `logging.keep_rotated` of them.
//! The file is unbuffered, so each event is on disk once written.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::config::{expand_tilde, LoggingConfig};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "toolbridge=info,warn";

/// Install the global subscriber.
///
/// Returns the log file path when logging to a file. Calling this twice is
/// harmless; the second subscriber is discarded.
pub fn init_tracing(config: &LoggingConfig) -> std::io::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(config.level.as_deref().unwrap_or(DEFAULT_FILTER))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    });

    let Some(dir) = config.log_dir.as_deref() else {
        let builder = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true);
        let installed = if config.json {
            builder.json().try_init().is_ok()
        } else {
            builder.try_init().is_ok()
        };
        if installed {
            tracing::debug!(version = env!("CARGO_PKG_VERSION"), "logging to stderr");
        }
        return Ok(None);
    };

    let log_dir = PathBuf::from(expand_tilde(dir));
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(&config.file_name);
    rotate_log_file(&log_path, config.keep_rotated)?;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            log_file = %log_path.display(),
            keep_rotated = config.keep_rotated,
            pid = std::process::id(),
            "toolbridge logging started"
        );
    }
    Ok(Some(log_path))
}

/// `base` with a `.n` suffix appended to its file name.
fn rotated_path(base: &Path, n: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `base` → `base.1` → … → `base.{keep}`, dropping what falls off the end.
///
/// With `keep == 0` the previous file is removed outright. Gaps in the
/// chain are fine.
pub fn rotate_log_file(base: &Path, keep: u32) -> std::io::Result<()> {
    let ignore_missing = |result: std::io::Result<()>| match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    };

    if keep == 0 {
        return ignore_missing(std::fs::remove_file(base));
    }

    ignore_missing(std::fs::remove_file(rotated_path(base, keep)))?;
    for n in (1..keep).rev() {
        ignore_missing(std::fs::rename(
            rotated_path(base, n),
            rotated_path(base, n + 1),
        ))?;
    }
    ignore_missing(std::fs::rename(base, rotated_path(base, 1)))
}
