//! Rich terminal display utilities for enhanced CLI output.
//!
//! Provides styled tables, progress bars, and formatted output
//! for a professional command-line experience.

pub mod help;
pub mod progress;
pub mod tables;
pub mod theme;

pub use help::{create_help_text, format_help_section};
pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{
    TableBuilder, create_grid_table, create_ledger_summary_table, create_lid_stats_table,
    create_sweep_report_table,
};
pub use theme::{THEME, Theme};
