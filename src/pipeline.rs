//! The triage loop: one sequential pass over the input stream.

use std::io;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use punt_device::DeviceBridge;
use punt_logs::{
    Classifier, ExceptionScanner, LogParser, PersistenceError, ProcessTracker, ResourceSampler,
    RotatingWriter, StatusLine, Verdict,
};
use punt_types::{LogRecord, Presenter, Session, SessionStats};

use crate::config::{Config, ConfigSummary};

/// Longest input line buffered; anything longer is dropped as unparseable
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

/// How the input loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    EndOfStream,
    Interrupted,

    /// Reading the input failed; records up to that point were handled
    ReadFailed,
}

/// End-of-session record written as `session.json`
#[derive(Debug, Serialize)]
struct SessionSummary<'a> {
    session: &'a str,
    created: DateTime<Local>,
    output_dir: &'a Path,
    files: u64,
    persisted_lines: u64,
    stats: &'a SessionStats,
    config: &'a ConfigSummary,
}

/// Owns every component for the lifetime of one session
pub struct Pipeline<B, P> {
    session: Session,
    config: ConfigSummary,
    tracker: ProcessTracker<B>,
    classifier: Classifier,
    exceptions: ExceptionScanner,
    writer: RotatingWriter,
    sampler: ResourceSampler,
    status: StatusLine,
    presenter: P,
    stats: SessionStats,
}

impl<B: DeviceBridge, P: Presenter> Pipeline<B, P> {
    pub fn new(config: &Config, session: Session, tracker: ProcessTracker<B>, presenter: P) -> Self {
        let writer = if config.save {
            RotatingWriter::new(&config.log_dir, &session, config.rotate_lines)
        } else {
            RotatingWriter::disabled()
        };

        Self {
            config: config.summary(),
            classifier: Classifier::new(
                config.levels.clone(),
                config.select.clone(),
                config.reject.clone(),
            ),
            exceptions: config.exceptions.clone(),
            writer,
            sampler: ResourceSampler::new(config.sample_interval),
            status: StatusLine::new(Instant::now()),
            session,
            tracker,
            presenter,
            stats: SessionStats::default(),
        }
    }

    /// Process `input` until it ends or `cancel` fires.
    ///
    /// The writer is closed on every exit path. A persistence failure ends
    /// the run with an error.
    pub async fn run<R>(
        &mut self,
        mut input: R,
        cancel: CancellationToken,
    ) -> Result<Outcome, PersistenceError>
    where
        R: AsyncBufRead + Unpin,
    {
        info!(
            session = %self.session.id,
            packages = ?self.tracker.packages(),
            output = %self.writer.session_dir().display(),
            "session started"
        );

        let mut buf = Vec::new();
        let mut seq = 0;

        // Inside an over-long line, discarding up to its terminator
        let mut skipping = false;

        let outcome = loop {
            buf.clear();
            let mut limited = (&mut input).take(MAX_LINE_BYTES);
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Outcome::Interrupted,
                read = limited.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    if skipping {
                        seq += 1;
                        self.drop_oversized(seq);
                    }
                    break Outcome::EndOfStream;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "input read failed, ending session");
                    break Outcome::ReadFailed;
                }
            }

            let terminated = buf.last() == Some(&b'\n');
            if !terminated && buf.len() as u64 >= MAX_LINE_BYTES {
                skipping = true;
                continue;
            }
            if skipping {
                skipping = false;
                seq += 1;
                self.drop_oversized(seq);
                continue;
            }

            seq += 1;
            let line = String::from_utf8_lossy(&buf);
            if let Err(e) = self.process_line(&line, seq).await {
                self.abort(&e);
                return Err(e);
            }
        };

        self.finish(outcome)?;
        Ok(outcome)
    }

    /// Run one input line through the pipeline.
    ///
    /// Returns the verdict, or `None` for a line that could not be parsed.
    pub async fn process_line(
        &mut self,
        line: &str,
        seq: u64,
    ) -> Result<Option<Verdict>, PersistenceError> {
        self.stats.lines += 1;

        let verdict = match LogParser::parse(line, seq) {
            Ok(record) => {
                let verdict = self.triage(&record).await?;
                Some(verdict)
            }
            Err(e) => {
                self.stats.parse_failures += 1;
                debug!(seq, error = %e, line = line.trim_end(), "unparseable line");
                None
            }
        };

        self.sample_resources().await?;
        self.render_status();
        Ok(verdict)
    }

    /// Count a line that exceeded `MAX_LINE_BYTES` as a parse failure
    fn drop_oversized(&mut self, seq: u64) {
        self.stats.lines += 1;
        self.stats.parse_failures += 1;
        debug!(seq, limit = MAX_LINE_BYTES, "line too long, dropped");
        self.render_status();
    }

    async fn triage(&mut self, record: &LogRecord) -> Result<Verdict, PersistenceError> {
        if self.exceptions.is_exception(record) {
            self.stats.exceptions += 1;
        }

        let verdict = if self.classifier.retains(record.level) {
            let membership = self.tracker.lookup(&record.pid).await;
            self.classifier.classify(record, membership)
        } else {
            Verdict::LevelFiltered
        };
        self.stats.record(verdict);
        trace!(seq = record.seq, pid = %record.pid, verdict = verdict.label(), "classified");

        if verdict.is_kept() {
            let highlights = if verdict == Verdict::SelectedUntracked {
                self.classifier.highlights(record)
            } else {
                Vec::new()
            };
            presented(self.presenter.record(record, verdict, &highlights));
            self.writer.append(&record.raw)?;
        } else {
            presented(self.presenter.garbage(record, verdict));
        }

        Ok(verdict)
    }

    /// Sample tracked processes if the interval has elapsed
    async fn sample_resources(&mut self) -> Result<(), PersistenceError> {
        let now = Instant::now();
        if self.tracker.is_passthrough() || !self.sampler.is_due(now) {
            return Ok(());
        }

        let pids: Vec<String> = self.tracker.tracked().map(str::to_string).collect();
        if pids.is_empty() {
            return Ok(());
        }

        let samples = self.sampler.sample(self.tracker.bridge(), &pids, now).await;
        for sample in &samples {
            self.writer.append(&sample.to_line())?;
        }
        if !samples.is_empty() {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn render_status(&mut self) {
        let line = self.status.render(
            Instant::now(),
            self.writer.current_path(),
            self.sampler.latest(),
            self.stats.exceptions,
        );
        presented(self.presenter.status(&line));
    }

    /// Clean shutdown: close the writer and record the session summary
    fn finish(&mut self, outcome: Outcome) -> Result<(), PersistenceError> {
        presented(self.presenter.clear_status());
        self.writer.close()?;

        info!(
            session = %self.session.id,
            ?outcome,
            lines = self.stats.lines,
            kept = self.stats.kept(),
            dropped = self.stats.dropped(),
            parse_failures = self.stats.parse_failures,
            exceptions = self.stats.exceptions,
            files = self.writer.files(),
            "session ended"
        );
        info!(config = ?self.config, "used config");

        if self.writer.is_enabled() && self.writer.files() > 0 {
            let summary = SessionSummary {
                session: &self.session.id,
                created: self.session.created,
                output_dir: self.writer.session_dir(),
                files: self.writer.files(),
                persisted_lines: self.writer.lines(),
                stats: &self.stats,
                config: &self.config,
            };
            match serde_json::to_string_pretty(&summary) {
                Ok(json) => {
                    if let Err(e) = self.writer.write_summary(&json) {
                        warn!(error = %e, "failed to write session summary");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize session summary"),
            }
        }
        Ok(())
    }

    /// Shutdown after a persistence failure; the writer has already closed
    /// its file
    fn abort(&mut self, error: &PersistenceError) {
        presented(self.presenter.clear_status());
        let _ = self.writer.close();
        error!(session = %self.session.id, %error, "persistence failed, stopping");
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn writer(&self) -> &RotatingWriter {
        &self.writer
    }

    pub fn tracker(&self) -> &ProcessTracker<B> {
        &self.tracker
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }
}

/// Terminal trouble never stops the pipeline
fn presented(result: io::Result<()>) {
    if let Err(e) = result {
        debug!(error = %e, "presentation failed");
    }
}
