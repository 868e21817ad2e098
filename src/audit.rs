//! Append-only audit log of every invocation presented to the guard.
//!
//! The log is a single pretty-printed JSON array, rewritten in full on each
//! append. Concurrent hooks serialize on an exclusive advisory lock held for
//! the whole read-append-rewrite cycle. A missing, empty, or unparseable log
//! is treated as an empty array, so one corrupt write never wedges the hook.

use fs2::FileExt;
use serde_json::Value;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default log location, relative to the working directory.
pub const DEFAULT_AUDIT_LOG_PATH: &str = "logs/pre_tool_use.json";

/// Error type for audit log access.
#[derive(Debug)]
pub enum AuditError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "audit log I/O error: {e}"),
            Self::Json(e) => write!(f, "audit log serialization error: {e}"),
        }
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for AuditError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Stats from one append.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AuditAppend {
    /// Entries in the log after the append.
    pub entries: usize,
    /// The previous contents could not be parsed and were discarded.
    pub recovered_corrupt: bool,
}

/// File-backed audit log.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log at the default location under `cwd`.
    #[must_use]
    pub fn in_dir(cwd: &Path) -> Self {
        Self::new(cwd.join(DEFAULT_AUDIT_LOG_PATH))
    }

    /// Append `entry` to the end of the log, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created, locked, or rewritten.
    /// Corrupt existing content is not an error.
    pub fn append(&self, entry: &Value) -> Result<AuditAppend, AuditError> {
        let mut file = open_locked(&self.path)?;
        let (mut entries, recovered_corrupt) = read_entries(&mut file)?;
        if recovered_corrupt {
            warn!(path = %self.path.display(), "audit log was unreadable; starting a new array");
        }

        entries.push(entry.clone());
        rewrite_entries(&mut file, &entries)?;

        Ok(AuditAppend {
            entries: entries.len(),
            recovered_corrupt,
        })
    }

    /// Read all entries. A missing or corrupt log reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be opened or read.
    pub fn load(&self) -> Result<Vec<Value>, AuditError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let (entries, _) = read_entries(&mut file)?;
        Ok(entries)
    }
}

fn open_locked(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

/// Parse the whole file as a JSON array; anything else reads as empty.
fn read_entries(file: &mut File) -> io::Result<(Vec<Value>, bool)> {
    file.seek(SeekFrom::Start(0))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;

    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok((Vec::new(), false));
    }

    match serde_json::from_slice::<Vec<Value>>(&raw) {
        Ok(entries) => Ok((entries, false)),
        Err(_) => Ok((Vec::new(), true)),
    }
}

fn rewrite_entries(file: &mut File, entries: &[Value]) -> Result<(), AuditError> {
    let body = serde_json::to_vec_pretty(entries)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&body)?;
    file.sync_data()?;
    Ok(())
}
