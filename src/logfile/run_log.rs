//! Plain-text error log, created on first failure.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::error::LogError;

/// Append-only log of per-tick failures.
///
/// Lines read `YYYY-MM-DD HH:MM:SS ERROR: <message>`. The file is opened and
/// closed for every entry so no handle is held between ticks.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render an entry without writing it.
    pub fn format_entry<Tz: TimeZone>(at: &DateTime<Tz>, message: &str) -> String {
        format!("{} ERROR: {}", at.naive_local().format("%Y-%m-%d %H:%M:%S"), message)
    }

    /// Append one timestamped error line, creating the file and its parent
    /// directories on first use.
    pub fn record<Tz: TimeZone>(&self, at: &DateTime<Tz>, message: &str) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LogError::io(parent, e))?;
        }

        let line = format!("{}\n", Self::format_entry(at, message));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LogError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| LogError::io(&self.path, e))
    }
}
