//! Terminal presentation for punt
//!
//! Prints kept records with colored level badges and keeps a single status
//! line redrawn in place underneath them.

pub mod terminal;
pub mod ui;

pub use terminal::TerminalPresenter;
pub use ui::{Theme, fit_to_width, format_record};
