//! Durable CSV sample log.
//!
//! Every write is encoded fully in memory, appended with a single
//! `write_all`, then fsynced before returning. A crash can therefore leave at
//! most one incomplete trailing line, which [`ensure_header`] trims on the next
//! start.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use csv::{Terminator, WriterBuilder};
use tracing::{info, warn};

use crate::error::LogError;
use crate::schedule::BoundaryLabel;
use crate::sensor::Reading;

/// Column names, written once at the top of the log.
pub const HEADER: [&str; 4] = ["date", "time_24h", "temp_F", "humidity_pct"];

/// How far back from the end to look for the last complete line.
const TAIL_SCAN: u64 = 4096;

/// One data row of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub date: String,
    pub time: String,
    pub temp_f: f64,
    pub humidity_pct: f64,
}

impl Row {
    /// Build a row from a boundary label and a validated reading.
    pub fn new(label: BoundaryLabel, reading: &Reading) -> Self {
        Self {
            date: label.date,
            time: label.time,
            temp_f: reading.temperature_f(),
            humidity_pct: reading.humidity_pct,
        }
    }

    /// The four CSV fields, numbers fixed to two decimals.
    pub fn fields(&self) -> [String; 4] {
        [
            self.date.clone(),
            self.time.clone(),
            format!("{:.2}", self.temp_f),
            format!("{:.2}", self.humidity_pct),
        ]
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [date, time, temp, humidity] = self.fields();
        write!(f, "['{}', '{}', '{}', '{}']", date, time, temp, humidity)
    }
}

/// What [`ensure_header`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// The file was missing or empty and now holds the header.
    Written,
    /// The file already had content; nothing changed.
    Present,
    /// An incomplete trailing line left by a crash was removed.
    Repaired { dropped_bytes: u64 },
}

/// Make sure the log exists and starts with the header row.
///
/// Creates parent directories as needed. Calling it on an initialised log is
/// a no-op apart from trimming a torn trailing line.
pub fn ensure_header(path: &Path) -> Result<HeaderStatus, LogError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent).map_err(|e| LogError::io(parent, e))?;
    }

    let existed = path.exists();
    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(LogError::io(path, e)),
    };

    let mut status = HeaderStatus::Present;
    if len > 0 {
        let kept = repair_torn_tail(path, len).map_err(|e| LogError::io(path, e))?;
        if kept == len {
            return Ok(HeaderStatus::Present);
        }
        status = HeaderStatus::Repaired {
            dropped_bytes: len - kept,
        };
        if kept > 0 {
            return Ok(status);
        }
    }

    let bytes = encode_record(path, HEADER)?;
    append_bytes(path, &bytes)?;
    if !existed {
        if let Some(parent) = parent {
            sync_dir(parent).map_err(|e| LogError::io(parent, e))?;
        }
    }
    info!("Wrote header to {}", path.display());

    Ok(match status {
        HeaderStatus::Present => HeaderStatus::Written,
        repaired => repaired,
    })
}

/// Append one row and force it to stable storage.
pub fn append_row(path: &Path, row: &Row) -> Result<(), LogError> {
    let bytes = encode_record(path, row.fields())?;
    append_bytes(path, &bytes)
}

/// Encode a single record, `\n`-terminated.
fn encode_record<I, T>(path: &Path, fields: I) -> Result<Vec<u8>, LogError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wtr = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(fields).map_err(|e| LogError::csv(path, e))?;
    wtr.into_inner()
        .map_err(|e| LogError::io(path, io::Error::new(e.error().kind(), e.error().to_string())))
}

fn append_bytes(path: &Path, bytes: &[u8]) -> Result<(), LogError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LogError::io(path, e))?;
    append_or_rollback(&mut file, bytes).map_err(|e| LogError::io(path, e))
}

/// An append-only destination that can be cut back to an earlier length.
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Write `bytes` in full and sync, or leave the target at its previous length.
///
/// A failed write (ENOSPC, EFBIG) can leave part of the record behind; the
/// next append would then continue that fragment on the same line.
fn append_or_rollback<T: AppendTarget>(target: &mut T, bytes: &[u8]) -> io::Result<()> {
    let before = target.current_len()?;
    let written = target
        .write_all(bytes)
        .and_then(|()| target.flush())
        .and_then(|()| target.sync());

    if let Err(e) = written {
        match target.truncate_to(before).and_then(|()| target.sync()) {
            Ok(()) => warn!("Rolled back a partial append: {}", e),
            Err(rollback) => warn!("Could not roll back a partial append: {}", rollback),
        }
        return Err(e);
    }
    Ok(())
}

/// Drop an incomplete last line. Returns the length kept.
fn repair_torn_tail(path: &Path, len: u64) -> io::Result<u64> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let scan = len.min(TAIL_SCAN);
    file.seek(SeekFrom::Start(len - scan))?;
    let mut tail = Vec::with_capacity(scan as usize);
    Read::by_ref(&mut file).take(scan).read_to_end(&mut tail)?;

    if tail.last() == Some(&b'\n') {
        return Ok(len);
    }

    let kept = match tail.iter().rposition(|&b| b == b'\n') {
        Some(i) => len - scan + i as u64 + 1,
        None if scan == len => 0,
        None => {
            // Not one of our lines; terminate it rather than guess
            file.seek(SeekFrom::End(0))?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            warn!("Terminated an overlong unterminated line in {}", path.display());
            return Ok(len);
        }
    };

    file.set_len(kept)?;
    file.sync_all()?;
    warn!(
        "Dropped {} bytes of a torn trailing line from {}",
        len - kept,
        path.display()
    );
    Ok(kept)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
