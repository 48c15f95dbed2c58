//! Terminal rendering of run reports

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Tables with a totals row
    #[default]
    Table,
    /// One JSON document for the whole report
    Json,
    /// `key: value` lines, one block per row
    Plain,
}

/// A row of a report section
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// Render rows as a table, with an optional bold totals row at the bottom
pub fn render_table<T: TableDisplay>(rows: &[T], totals: Option<Vec<String>>) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(T::headers());

    for row in rows {
        table.add_row(row.row());
    }
    if let Some(totals) = totals {
        table.add_row(
            totals
                .into_iter()
                .map(|v| Cell::new(v).add_attribute(Attribute::Bold)),
        );
    }
    table.to_string()
}

/// Render rows as `header: value` blocks separated by `---`
pub fn render_plain<T: TableDisplay>(rows: &[T]) -> String {
    let headers = T::headers();
    rows.iter()
        .map(|row| {
            headers
                .iter()
                .zip(row.row())
                .map(|(h, v)| format!("{}: {}", h, v))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Severity of a one-line status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Warning,
    Info,
}

pub fn status_line(status: Status, message: &str) -> String {
    match status {
        Status::Success => format!("✅ {}", message.green()),
        Status::Failure => format!("❌ {}", message.red()),
        Status::Warning => format!("⚠️  {}", message.yellow()),
        Status::Info => format!("ℹ️  {}", message),
    }
}

/// Print a status line; failures go to stderr
pub fn print_status(status: Status, message: &str) {
    match status {
        Status::Failure => eprintln!("{}", status_line(status, message)),
        _ => println!("{}", status_line(status, message)),
    }
}
