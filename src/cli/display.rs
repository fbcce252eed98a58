//! Table and color helpers for human-readable output.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::{style, StyledObject};

/// Borderless two-column table of field names and values.
pub fn detail_table<'a>(rows: impl IntoIterator<Item = (&'a str, String)>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (field, value) in rows {
        table.add_row(vec![
            Cell::new(field.to_uppercase()).set_alignment(CellAlignment::Left),
            Cell::new(value),
        ]);
    }
    table
}

/// Color a run or evaluation status.
pub fn colorize_status(status: &str) -> StyledObject<&str> {
    match status.to_lowercase().as_str() {
        "pass" => style(status).green().bold(),
        "fail" => style(status).red().bold(),
        "mixed" => style(status).yellow().bold(),
        "running" => style(status).cyan(),
        "error" => style(status).red(),
        "stopped" => style(status).dim(),
        _ => style(status),
    }
}

/// Pass rate as a percentage, `-` when unset.
pub fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0))
}
