use thiserror::Error;

use punt_types::{LogLevel, LogRecord};

/// Width of the fixed header column window: date, time, pid, tid, level
pub const HEADER_WIDTH: usize = 32;

/// Why a line could not be turned into a record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line is {len} bytes, shorter than the 32-byte header")]
    TooShort { len: usize },

    #[error("header window ends inside a multi-byte character")]
    SplitCharacter,

    #[error("expected 5 header fields, found {found}")]
    FieldCount { found: usize },

    #[error("unknown log level `{0}`")]
    UnknownLevel(String),
}

/// Parser for `logcat -v threadtime` lines
pub struct LogParser;

impl LogParser {
    /// Parse a raw line into a LogRecord
    pub fn parse(line: &str, seq: u64) -> Result<LogRecord, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < HEADER_WIDTH {
            return Err(ParseError::TooShort { len: line.len() });
        }

        let header = line.get(..HEADER_WIDTH).ok_or(ParseError::SplitCharacter)?;
        let fields: Vec<&str> = header.split_whitespace().collect();
        let [date, time, pid, tid, level] = fields.as_slice() else {
            return Err(ParseError::FieldCount {
                found: fields.len(),
            });
        };
        let level =
            LogLevel::from_token(level).ok_or_else(|| ParseError::UnknownLevel(level.to_string()))?;

        let (tag, message) = Self::split_tag(Self::remainder(line));

        Ok(LogRecord {
            seq,
            date: date.to_string(),
            time: time.to_string(),
            pid: pid.to_string(),
            tid: tid.to_string(),
            level,
            tag: tag.to_string(),
            message: message.to_string(),
            raw: line.to_string(),
        })
    }

    /// Everything after the header and its single separator character
    fn remainder(line: &str) -> &str {
        let rest = &line[HEADER_WIDTH..];
        match rest.chars().next() {
            Some(sep) => &rest[sep.len_utf8()..],
            None => "",
        }
    }

    /// Split `Tag: message`; without a colon the whole remainder is the message
    fn split_tag(remainder: &str) -> (&str, &str) {
        match remainder.split_once(':') {
            Some((tag, message)) => (tag.trim(), message.trim_start()),
            None => ("", remainder),
        }
    }
}
