use std::io::{self, IsTerminal, Stdout, Write, stdout};

use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};

use punt_types::{LogRecord, Presenter, Verdict};

use crate::ui::{Theme, fit_to_width, format_record};

/// Width used when the terminal size cannot be queried
const FALLBACK_WIDTH: usize = 80;

/// Record stream plus an in-place status line on a terminal
pub struct TerminalPresenter<W: Write> {
    out: W,

    /// Emit colors and cursor control
    interactive: bool,

    /// Print a dot per kept record instead of the record, and no status line
    quiet: bool,

    /// A status line (or a run of dots) occupies the current row
    row_dirty: bool,
}

impl TerminalPresenter<Stdout> {
    /// Presenter on stdout; colors and the status line are only used when
    /// stdout is a terminal
    pub fn stdout(quiet: bool) -> Self {
        let interactive = stdout().is_terminal();
        Self::new(stdout(), interactive, quiet)
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, interactive: bool, quiet: bool) -> Self {
        Self {
            out,
            interactive,
            quiet,
            row_dirty: false,
        }
    }

    /// Leave the row the status line was on empty and flush
    pub fn finish(&mut self) -> io::Result<()> {
        self.clear_status()?;
        self.out.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn width(&self) -> usize {
        terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(FALLBACK_WIDTH)
            .saturating_sub(1)
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn record(
        &mut self,
        record: &LogRecord,
        _verdict: Verdict,
        highlights: &[(usize, usize)],
    ) -> io::Result<()> {
        if self.quiet {
            if self.interactive {
                write!(self.out, "{}", Theme::dot().apply('.'))?;
            } else {
                write!(self.out, ".")?;
            }
            self.row_dirty = true;
            return self.out.flush();
        }

        self.clear_status()?;
        let line = format_record(record, highlights, self.interactive);
        writeln!(self.out, "{}", line)?;
        self.out.flush()
    }

    fn garbage(&mut self, _record: &LogRecord, _verdict: Verdict) -> io::Result<()> {
        Ok(())
    }

    fn status(&mut self, line: &str) -> io::Result<()> {
        if !self.interactive || self.quiet {
            return Ok(());
        }
        let width = self.width();
        queue!(
            self.out,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(Theme::status().apply(fit_to_width(line, width)))
        )?;
        self.row_dirty = true;
        self.out.flush()
    }

    fn clear_status(&mut self) -> io::Result<()> {
        if !self.row_dirty {
            return Ok(());
        }
        self.row_dirty = false;
        if self.interactive && !self.quiet {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))
        } else {
            // Dots are kept; just end their row
            writeln!(self.out)
        }
    }
}

impl<W: Write> Drop for TerminalPresenter<W> {
    fn drop(&mut self) {
        // Best effort cleanup on drop
        let _ = self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punt_types::LogLevel;

    fn record(message: &str) -> LogRecord {
        LogRecord {
            seq: 1,
            date: "01-01".to_string(),
            time: "10:00:00.000".to_string(),
            pid: "1234".to_string(),
            tid: "1234".to_string(),
            level: LogLevel::Info,
            tag: "MyTag".to_string(),
            message: message.to_string(),
            raw: String::new(),
        }
    }

    fn output(presenter: &TerminalPresenter<Vec<u8>>) -> String {
        String::from_utf8_lossy(presenter.get_ref()).into_owned()
    }

    #[test]
    fn test_plain_output_has_no_escapes() {
        let mut presenter = TerminalPresenter::new(Vec::new(), false, false);
        presenter.status("| 0s").unwrap();
        presenter.record(&record("hello world"), Verdict::KeptTracked, &[]).unwrap();
        presenter.garbage(&record("dropped"), Verdict::DroppedUntracked).unwrap();
        assert_eq!(
            output(&presenter),
            "01-01 10:00:00.000  1234( 1234)  INF MyTag: hello world\n"
        );
    }

    #[test]
    fn test_status_cleared_before_record() {
        let mut presenter = TerminalPresenter::new(Vec::new(), true, false);
        presenter.status("| 0s | status").unwrap();
        let before = output(&presenter).len();
        presenter.record(&record("hello"), Verdict::KeptTracked, &[]).unwrap();

        let out = output(&presenter);
        let tail = &out[before..];
        // "\x1b[2K" clears the current line before the record is written
        let clear = tail.find("\u{1b}[2K").unwrap();
        let text = tail.find("hello").unwrap();
        assert!(clear < text);
    }

    #[test]
    fn test_quiet_mode_prints_a_dot_per_kept_record() {
        let mut presenter = TerminalPresenter::new(Vec::new(), false, true);
        presenter.record(&record("kept"), Verdict::KeptTracked, &[]).unwrap();
        presenter.garbage(&record("dropped"), Verdict::DroppedUntracked).unwrap();
        assert_eq!(output(&presenter), ".");

        presenter.status("| 0s").unwrap();
        presenter.record(&record("again"), Verdict::SelectedUntracked, &[]).unwrap();
        presenter.garbage(&record("filtered"), Verdict::LevelFiltered).unwrap();
        assert_eq!(output(&presenter), "..");

        // The run of dots is terminated on shutdown
        presenter.finish().unwrap();
        assert_eq!(output(&presenter), "..\n");
    }
}
