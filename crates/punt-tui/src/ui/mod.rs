mod record;
mod status_bar;
mod theme;

pub use record::format_record;
pub use status_bar::fit_to_width;
pub use theme::Theme;
