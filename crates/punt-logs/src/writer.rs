use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use punt_types::Session;

/// Name of the end-of-session summary written next to the log files
pub const SUMMARY_FILE: &str = "session.json";

/// Failure to persist a kept record. Not recoverable for the run.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write log file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Open output file
struct ActiveFile {
    path: PathBuf,
    out: BufWriter<File>,
}

/// Appends kept records to `baseDir/YYYY-M-D/<session>/log-N.txt`,
/// starting a new file every `threshold` lines.
pub struct RotatingWriter {
    enabled: bool,
    session_dir: PathBuf,

    /// Lines per file
    threshold: u64,

    /// Lines written in this session
    lines: u64,

    /// Line count at which the next rotation happens. Advances by
    /// `threshold` on every rotation.
    marker: u64,

    /// N of the most recently opened file (0 = none yet)
    file_index: u64,

    active: Option<ActiveFile>,
}

impl RotatingWriter {
    /// Create a writer for `session`. Nothing touches the disk until the
    /// first line is appended.
    pub fn new(base_dir: &Path, session: &Session, threshold: u64) -> Self {
        let threshold = threshold.max(1);
        Self {
            enabled: true,
            session_dir: base_dir.join(session.date_segment()).join(&session.id),
            threshold,
            lines: 0,
            marker: threshold,
            file_index: 0,
            active: None,
        }
    }

    /// A writer that accepts and discards everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            session_dir: PathBuf::new(),
            threshold: 1,
            lines: 0,
            marker: 1,
            file_index: 0,
            active: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one line (a terminator is added)
    pub fn append(&mut self, line: &str) -> Result<(), PersistenceError> {
        if !self.enabled {
            return Ok(());
        }

        if self.active.is_none() {
            self.open_next()?;
        } else if self.lines >= self.marker {
            self.rotate()?;
        }

        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if let Err(source) = active.out.write_all(record.as_bytes()) {
            let path = active.path.clone();
            self.abandon();
            return Err(PersistenceError::Write { path, source });
        }

        self.lines += 1;
        Ok(())
    }

    /// Flush buffered lines to disk without closing the file
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        if let Err(source) = active.out.flush() {
            let path = active.path.clone();
            self.abandon();
            return Err(PersistenceError::Write { path, source });
        }
        Ok(())
    }

    /// Flush and close the current file. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), PersistenceError> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        active
            .out
            .flush()
            .map_err(|source| PersistenceError::Write {
                path: active.path.clone(),
                source,
            })
    }

    /// Write the end-of-session summary into the session directory
    pub fn write_summary(&self, contents: &str) -> Result<(), PersistenceError> {
        let path = self.session_dir.join(SUMMARY_FILE);
        fs::write(&path, contents).map_err(|source| PersistenceError::Write { path, source })
    }

    fn rotate(&mut self) -> Result<(), PersistenceError> {
        self.close()?;
        self.marker += self.threshold;
        self.open_next()
    }

    fn open_next(&mut self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.session_dir).map_err(|source| PersistenceError::CreateDir {
            path: self.session_dir.clone(),
            source,
        })?;

        self.file_index += 1;
        let path = self.session_dir.join(format!("log-{}.txt", self.file_index));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistenceError::Open {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "writing log file");
        self.active = Some(ActiveFile {
            path,
            out: BufWriter::new(file),
        });
        Ok(())
    }

    /// Best-effort flush and close after a failed write
    fn abandon(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.out.flush() {
                warn!(path = %active.path.display(), error = %e, "flush after write failure failed");
            }
        }
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Directory holding this session's files
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Lines written in this session
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Number of files opened in this session
    pub fn files(&self) -> u64 {
        self.file_index
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        // Best effort cleanup on drop
        let _ = self.close();
    }
}
