//! Log processing for punt
//!
//! This crate provides header parsing, process membership tracking,
//! select/reject classification, rotating persistence and telemetry.

mod filter;
mod parser;
mod telemetry;
mod tracker;
mod writer;

pub use filter::{Classifier, ExceptionScanner, RuleSet, DEFAULT_EXCEPTION_PATTERN, WILDCARD};
pub use parser::{HEADER_WIDTH, LogParser, ParseError};
pub use telemetry::{DEFAULT_SAMPLE_INTERVAL, ResourceSampler, StatusLine, format_elapsed};
pub use tracker::ProcessTracker;
pub use writer::{PersistenceError, RotatingWriter, SUMMARY_FILE};

// Re-export types used in our public API
pub use punt_types::{LogLevel, LogRecord, Membership, Verdict};
