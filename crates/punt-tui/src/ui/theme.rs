use crossterm::style::{Attribute, Color, ContentStyle, Stylize};

use punt_types::LogLevel;

/// Color theme for terminal output
pub struct Theme;

impl Theme {
    // Record columns
    pub const DATE: Color = Color::Grey;
    pub const TIME: Color = Color::Blue;
    pub const PID: Color = Color::Grey;
    pub const TID: Color = Color::DarkGrey;
    pub const TAG: Color = Color::Cyan;
    pub const MESSAGE: Color = Color::White;

    // Accent colors
    pub const HIGHLIGHT: Color = Color::Yellow;

    // Log level badge backgrounds
    pub const LOG_VERBOSE: Color = Color::DarkGrey;
    pub const LOG_DEBUG: Color = Color::Blue;
    pub const LOG_INFO: Color = Color::DarkGreen;
    pub const LOG_WARN: Color = Color::Magenta;
    pub const LOG_ERROR: Color = Color::Red;
    pub const LOG_FATAL: Color = Color::DarkRed;

    pub fn fg(color: Color) -> ContentStyle {
        ContentStyle::new().with(color)
    }

    /// Bold white-on-color badge for a level
    pub fn level_badge(level: LogLevel) -> ContentStyle {
        let bg = match level {
            LogLevel::Verbose => Self::LOG_VERBOSE,
            LogLevel::Debug => Self::LOG_DEBUG,
            LogLevel::Info => Self::LOG_INFO,
            LogLevel::Warn => Self::LOG_WARN,
            LogLevel::Error => Self::LOG_ERROR,
            LogLevel::Fatal | LogLevel::Assert => Self::LOG_FATAL,
        };
        ContentStyle::new().with(Color::White).on(bg).attribute(Attribute::Bold)
    }

    /// Select-rule matches inside a rescued record
    pub fn highlight() -> ContentStyle {
        ContentStyle::new().with(Self::HIGHLIGHT).attribute(Attribute::Bold)
    }

    // Status line
    pub fn status() -> ContentStyle {
        ContentStyle::new().with(Color::Black).on(Color::Grey)
    }

    /// Dot printed for kept records in quiet mode
    pub fn dot() -> ContentStyle {
        ContentStyle::new().with(Self::LOG_INFO)
    }
}
