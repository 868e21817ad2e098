//! Diagnostic logging setup.
//!
//! The hook's stderr is reserved for block messages, so diagnostics are off
//! unless a filter is configured (`general.log_level`, `TOOL_GUARD_LOG`) or
//! `general.verbose` is set. Output goes to stderr or to `general.log_file`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::GeneralConfig;

/// Environment variable carrying a tracing filter directive.
pub const ENV_LOG_FILTER: &str = "TOOL_GUARD_LOG";

/// Filter used when `verbose` is set without an explicit level.
const VERBOSE_FILTER: &str = "tool_guard=debug";

const DISABLED_FILTER: &str = "off";

/// Filter directive selected by `general`.
#[must_use]
pub fn filter_directive(general: &GeneralConfig) -> String {
    match general.log_level.as_deref().map(str::trim) {
        Some(level) if !level.is_empty() => level.to_string(),
        _ if general.verbose => VERBOSE_FILTER.to_string(),
        _ => DISABLED_FILTER.to_string(),
    }
}

/// Install the global subscriber. Returns `false` when logging stays off or
/// a subscriber was already installed.
pub fn init_logging(general: &GeneralConfig) -> bool {
    let directive = filter_directive(general);
    if directive == DISABLED_FILTER {
        return false;
    }

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("[tool-guard] Warning: invalid log filter {directive:?}: {e}");
        EnvFilter::new(VERBOSE_FILTER)
    });

    let writer = match general.log_file.as_deref() {
        Some(path) if !path.trim().is_empty() => match open_log_file(&expand_tilde(path.trim())) {
            Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
            Err(e) => {
                eprintln!("[tool-guard] Warning: cannot open log file {path}: {e}");
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        _ => BoxMakeWriter::new(std::io::stderr),
    };

    // No ANSI: stderr may be relayed to the agent verbatim.
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .is_ok()
}

/// Expand a leading `~/` using the detected home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    crate::config::expand_tilde_with(path, dirs::home_dir().as_deref())
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
