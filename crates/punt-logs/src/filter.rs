use regex::Regex;
use std::collections::HashSet;

use punt_types::{LogLevel, LogRecord, Membership, Verdict};

/// Rule token that matches every record
pub const WILDCARD: &str = "*";

/// Default runtime-exception signature
pub const DEFAULT_EXCEPTION_PATTERN: &str = r"FATAL EXCEPTION|\b[\w$.]*Exception\b";

/// Compiled select or reject rules
#[derive(Clone)]
pub enum RuleSet {
    /// The wildcard rule: matches unconditionally
    Everything,

    /// Matches if any pattern is found in the tag or the message
    Patterns(Vec<Regex>),
}

impl RuleSet {
    /// Compile a rule list.
    ///
    /// Blank entries are skipped. Returns `Ok(None)` when nothing is left,
    /// which callers treat as "no rule configured". A wildcard entry anywhere
    /// makes the whole set match everything.
    pub fn compile<I, S>(rules: I) -> Result<Option<Self>, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        let mut wildcard = false;

        for rule in rules {
            let rule = rule.as_ref().trim();
            if rule.is_empty() {
                continue;
            }
            if rule == WILDCARD {
                wildcard = true;
                continue;
            }
            patterns.push(Regex::new(rule)?);
        }

        if wildcard {
            Ok(Some(Self::Everything))
        } else if patterns.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::Patterns(patterns)))
        }
    }

    /// Check the tag first, then the message
    pub fn matches(&self, record: &LogRecord) -> bool {
        match self {
            Self::Everything => true,
            Self::Patterns(patterns) => patterns
                .iter()
                .any(|re| re.is_match(&record.tag) || re.is_match(&record.message)),
        }
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            Self::Everything => Vec::new(),
            Self::Patterns(patterns) => {
                let mut spans: Vec<(usize, usize)> = patterns
                    .iter()
                    .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
                    .filter(|(start, end)| start < end)
                    .collect();
                spans.sort_unstable();
                merge_overlapping(spans)
            }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Everything)
    }

    /// Source patterns, for diagnostics
    pub fn patterns(&self) -> Vec<String> {
        match self {
            Self::Everything => vec![WILDCARD.to_string()],
            Self::Patterns(patterns) => patterns.iter().map(|re| re.as_str().to_string()).collect(),
        }
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.patterns()).finish()
    }
}

fn merge_overlapping(spans: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Keep/drop decision for parsed records
#[derive(Clone, Debug)]
pub struct Classifier {
    /// Levels that survive the level gate
    levels: HashSet<LogLevel>,

    /// Rescues records of untracked processes
    select: Option<RuleSet>,

    /// Discards records of tracked processes
    reject: Option<RuleSet>,
}

impl Classifier {
    pub fn new(levels: HashSet<LogLevel>, select: Option<RuleSet>, reject: Option<RuleSet>) -> Self {
        Self {
            levels,
            select,
            reject,
        }
    }

    /// Classifier retaining every level with no rules
    pub fn passthrough() -> Self {
        Self::new(LogLevel::ALL.into_iter().collect(), None, None)
    }

    /// Level gate, evaluated before membership is looked up
    pub fn retains(&self, level: LogLevel) -> bool {
        self.levels.contains(&level)
    }

    /// Decide what happens to a record whose membership has been resolved.
    ///
    /// `Membership::Unknown` is handled like `Ignored`: a record is only
    /// treated as tracked once its pid has been resolved to a watched package.
    pub fn classify(&self, record: &LogRecord, membership: Membership) -> Verdict {
        if !self.retains(record.level) {
            return Verdict::LevelFiltered;
        }

        match membership {
            Membership::Tracked => match &self.reject {
                Some(reject) if reject.matches(record) => Verdict::RejectedTracked,
                _ => Verdict::KeptTracked,
            },
            Membership::Ignored | Membership::Unknown => match &self.select {
                Some(select) if select.matches(record) => Verdict::SelectedUntracked,
                _ => Verdict::DroppedUntracked,
            },
        }
    }

    /// Byte ranges of the message that a select rule matched
    pub fn highlights(&self, record: &LogRecord) -> Vec<(usize, usize)> {
        self.select
            .as_ref()
            .map(|select| select.find_matches(&record.message))
            .unwrap_or_default()
    }

    pub fn levels(&self) -> &HashSet<LogLevel> {
        &self.levels
    }

    pub fn select(&self) -> Option<&RuleSet> {
        self.select.as_ref()
    }

    pub fn reject(&self) -> Option<&RuleSet> {
        self.reject.as_ref()
    }
}

/// Counts messages that look like a runtime exception
#[derive(Clone, Debug)]
pub struct ExceptionScanner {
    signature: Regex,
}

impl ExceptionScanner {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            signature: Regex::new(pattern)?,
        })
    }

    pub fn is_exception(&self, record: &LogRecord) -> bool {
        self.signature.is_match(&record.message)
    }
}

impl Default for ExceptionScanner {
    fn default() -> Self {
        Self {
            signature: Regex::new(DEFAULT_EXCEPTION_PATTERN)
                .expect("default exception pattern is valid"),
        }
    }
}
