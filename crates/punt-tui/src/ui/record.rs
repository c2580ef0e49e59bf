use punt_types::LogRecord;

use crate::ui::Theme;

/// Format a record for the terminal.
///
/// `highlights` are byte ranges of the message to emphasize; ranges that are
/// out of bounds or not on character boundaries are ignored.
pub fn format_record(record: &LogRecord, highlights: &[(usize, usize)], color: bool) -> String {
    let pid = format!("{:>5}", record.pid);
    let tid = format!("{:>5}", record.tid);
    let badge = format!(" {} ", record.level.as_str());

    if !color {
        let mut line = format!("{} {} {}({}) {}", record.date, record.time, pid, tid, badge);
        if !record.tag.is_empty() {
            line.push_str(&record.tag);
            line.push_str(": ");
        }
        line.push_str(&record.message);
        return line;
    }

    let mut line = format!(
        "{} {} {}({}) {}",
        Theme::fg(Theme::DATE).apply(&record.date),
        Theme::fg(Theme::TIME).apply(&record.time),
        Theme::fg(Theme::PID).apply(pid),
        Theme::fg(Theme::TID).apply(tid),
        Theme::level_badge(record.level).apply(badge),
    );
    if !record.tag.is_empty() {
        line.push_str(&Theme::fg(Theme::TAG).apply(format!("{}: ", record.tag)).to_string());
    }
    line.push_str(&highlight_message(&record.message, highlights));
    line
}

fn highlight_message(message: &str, highlights: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(message.len() + highlights.len() * 16);
    let mut pos = 0;

    for &(start, end) in highlights {
        if start < pos || end > message.len() {
            continue;
        }
        let (Some(before), Some(matched)) = (message.get(pos..start), message.get(start..end))
        else {
            continue;
        };
        out.push_str(&Theme::fg(Theme::MESSAGE).apply(before).to_string());
        out.push_str(&Theme::highlight().apply(matched).to_string());
        pos = end;
    }

    out.push_str(&Theme::fg(Theme::MESSAGE).apply(&message[pos..]).to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use punt_types::LogLevel;

    fn record(tag: &str, message: &str) -> LogRecord {
        LogRecord {
            seq: 1,
            date: "01-01".to_string(),
            time: "10:00:00.000".to_string(),
            pid: "1234".to_string(),
            tid: "99".to_string(),
            level: LogLevel::Warn,
            tag: tag.to_string(),
            message: message.to_string(),
            raw: String::new(),
        }
    }

    #[test]
    fn test_plain_format() {
        assert_eq!(
            format_record(&record("MyTag", "hello world"), &[], false),
            "01-01 10:00:00.000  1234(   99)  WRN MyTag: hello world"
        );
        assert_eq!(
            format_record(&record("", "no tag"), &[], false),
            "01-01 10:00:00.000  1234(   99)  WRN no tag"
        );
    }

    #[test]
    fn test_colored_format_keeps_text() {
        let line = format_record(&record("MyTag", "an error here"), &[(3, 8)], true);
        assert!(line.contains("\u{1b}["));
        assert!(line.contains("MyTag: "));
        assert!(line.contains("error"));
        assert!(line.contains(" here"));
    }

    #[test]
    fn test_bad_highlight_ranges_are_ignored() {
        let message = "héllo";
        let out = highlight_message(message, &[(2, 3), (0, 99)]);
        assert!(out.contains("héllo"));
    }
}
