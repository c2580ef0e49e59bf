//! Shared types for punt
//!
//! This crate contains the data structures passed between the parser, the
//! classifier, the writer and the presentation layer.

use chrono::{DateTime, Datelike, Local};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use std::io;

// ============================================================================
// Log Types
// ============================================================================

/// Log priority as emitted by the device logger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Assert,
}

impl LogLevel {
    /// Every level, lowest priority first
    pub const ALL: [LogLevel; 7] = [
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
        Self::Assert,
    ];

    /// Parse a single-character level code
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'V' => Some(Self::Verbose),
            'D' => Some(Self::Debug),
            'I' => Some(Self::Info),
            'W' => Some(Self::Warn),
            'E' => Some(Self::Error),
            'F' => Some(Self::Fatal),
            'A' => Some(Self::Assert),
            _ => None,
        }
    }

    /// Parse the level column of a header; it must be exactly one code
    pub fn from_token(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_code(c),
            _ => None,
        }
    }

    /// Single-character code
    pub fn code(&self) -> char {
        match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warn => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
            Self::Assert => 'A',
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verbose => "VRB",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Assert => "AST",
        }
    }
}

/// A single parsed log line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Position in the input stream, starting at 1
    pub seq: u64,

    pub date: String,
    pub time: String,
    pub pid: String,
    pub tid: String,
    pub level: LogLevel,

    /// Text before the first colon of the remainder (may be empty)
    pub tag: String,

    pub message: String,

    /// The line exactly as received, without its line terminator
    pub raw: String,
}

// ============================================================================
// Classification Types
// ============================================================================

/// Whether a process id belongs to a watched package
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    /// Currently resolved to a watched package
    Tracked,
    /// Resolved and found not to belong to any watched package
    Ignored,
    /// Never looked up in this run
    Unknown,
}

/// Outcome of classifying one record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Level not retained; membership was never evaluated
    LevelFiltered,
    KeptTracked,
    /// Tracked, but a reject rule matched
    RejectedTracked,
    /// Untracked, but a select rule matched
    SelectedUntracked,
    DroppedUntracked,
}

impl Verdict {
    /// Kept records are printed and persisted; everything else is garbage
    pub fn is_kept(&self) -> bool {
        matches!(self, Self::KeptTracked | Self::SelectedUntracked)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::LevelFiltered => "level-filtered",
            Self::KeptTracked => "kept-tracked",
            Self::RejectedTracked => "rejected-tracked",
            Self::SelectedUntracked => "selected-untracked",
            Self::DroppedUntracked => "dropped-untracked",
        }
    }
}

/// Running counters for one session
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionStats {
    pub lines: u64,
    pub parse_failures: u64,
    pub exceptions: u64,
    pub level_filtered: u64,
    pub kept_tracked: u64,
    pub rejected_tracked: u64,
    pub selected_untracked: u64,
    pub dropped_untracked: u64,
}

impl SessionStats {
    pub fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::LevelFiltered => self.level_filtered += 1,
            Verdict::KeptTracked => self.kept_tracked += 1,
            Verdict::RejectedTracked => self.rejected_tracked += 1,
            Verdict::SelectedUntracked => self.selected_untracked += 1,
            Verdict::DroppedUntracked => self.dropped_untracked += 1,
        }
    }

    pub fn kept(&self) -> u64 {
        self.kept_tracked + self.selected_untracked
    }

    pub fn dropped(&self) -> u64 {
        self.level_filtered + self.rejected_tracked + self.dropped_untracked
    }
}

// ============================================================================
// Session Types
// ============================================================================

/// Length of the random session identifier
pub const SESSION_ID_LEN: usize = 8;

/// One pipeline run
#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub created: DateTime<Local>,
}

impl Session {
    /// Start a session with a fresh random id
    pub fn new() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self::with_id(id, Local::now())
    }

    pub fn with_id(id: String, created: DateTime<Local>) -> Self {
        Self { id, created }
    }

    /// Date directory name, `YYYY-M-D` without zero padding
    pub fn date_segment(&self) -> String {
        format!(
            "{}-{}-{}",
            self.created.year(),
            self.created.month(),
            self.created.day()
        )
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Telemetry Types
// ============================================================================

/// Memory and thread usage of one device process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSample {
    pub pid: String,
    pub peak_kb: u64,
    pub hwm_kb: u64,
    pub rss_kb: u64,
    pub threads: u64,
    pub taken_at: DateTime<Local>,
}

impl ResourceSample {
    /// Line written to the session file alongside kept records
    pub fn to_line(&self) -> String {
        format!(
            "#### {} mem pid={} peak={} hwm={} rss={} threads={}",
            self.taken_at.format("%H:%M:%S"),
            self.pid,
            self.peak_kb,
            self.hwm_kb,
            self.rss_kb,
            self.threads
        )
    }

    /// Compact form for the status line
    pub fn summary(&self) -> String {
        format!(
            "{} rss {}M hwm {}M thr {}",
            self.pid,
            self.rss_kb / 1024,
            self.hwm_kb / 1024,
            self.threads
        )
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// Output surface for the pipeline driver.
///
/// Implementations own all terminal concerns; the driver only reports what
/// happened to each record.
pub trait Presenter {
    /// Print a kept record. `highlights` are byte ranges of the message that
    /// matched a select rule.
    fn record(
        &mut self,
        record: &LogRecord,
        verdict: Verdict,
        highlights: &[(usize, usize)],
    ) -> io::Result<()>;

    /// A record was classified as garbage
    fn garbage(&mut self, record: &LogRecord, verdict: Verdict) -> io::Result<()>;

    /// Redraw the transient status line in place
    fn status(&mut self, line: &str) -> io::Result<()>;

    /// Remove the status line, leaving the cursor at the start of an empty line
    fn clear_status(&mut self) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_codes() {
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_code(level.code()), Some(level));
        }
        assert_eq!(LogLevel::from_token("E"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_token("EE"), None);
        assert_eq!(LogLevel::from_token("X"), None);
    }

    #[test]
    fn test_session_id_and_date_segment() {
        let session = Session::new();
        assert_eq!(session.id.len(), SESSION_ID_LEN);
        assert!(session.id.chars().all(|c| c.is_ascii_alphanumeric()));

        let created = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        let session = Session::with_id("abc".to_string(), created);
        assert_eq!(session.date_segment(), "2024-3-7");
    }

    #[test]
    fn test_verdict_kept() {
        assert!(Verdict::KeptTracked.is_kept());
        assert!(Verdict::SelectedUntracked.is_kept());
        assert!(!Verdict::RejectedTracked.is_kept());
        assert!(!Verdict::DroppedUntracked.is_kept());
        assert!(!Verdict::LevelFiltered.is_kept());
    }
}
