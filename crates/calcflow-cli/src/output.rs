//! CLI output formatting.

use std::io::{self, Write};
use std::time::Duration;

use clap::ValueEnum;
use serde_json::Value;

use calcflow_core::tabdef::cell_text;
use calcflow_core::Row;
use calcflow_orchestration::ApplicationState;

/// How results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// The whole application state as pretty JSON.
    #[default]
    Json,
    /// One aligned text table per result table.
    Table,
}

/// Format a duration for display.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 0.001 {
        format!("{:.2}µs", secs * 1_000_000.0)
    } else if secs < 1.0 {
        format!("{:.2}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{secs:.3}s")
    } else {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{mins}m{remaining:.1}s")
    }
}

/// Pretty JSON of the inputs, store, and validation messages.
#[must_use]
pub fn format_state_json(state: &ApplicationState) -> String {
    serde_json::to_string_pretty(state).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) => cell_text(value).unwrap_or_default().to_string(),
        other => other.to_string(),
    }
}

fn pad_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    values
        .zip(widths)
        .map(|(v, &w)| format!("{v:<w$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// Render rows as an aligned text table.
///
/// Columns are taken in first-seen order across all rows, `@id` first.
#[must_use]
pub fn format_rows(rows: &[Row]) -> String {
    let mut columns: Vec<&str> = vec!["@id"];
    for row in rows {
        for key in row.keys() {
            if key != "@id" && !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(*c).map(display_cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = pad_line(columns.iter().copied(), &widths);
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in &cells {
        out.push('\n');
        out.push_str(&pad_line(row.iter().map(String::as_str), &widths));
    }
    out
}

/// Every table of the store, one block per `engine.tab` / table.
#[must_use]
pub fn format_state_tables(state: &ApplicationState) -> String {
    let mut blocks = Vec::new();
    for key in state.store.keys() {
        let Some(tables) = state.store.tab(key) else { continue };
        for (name, rows) in tables {
            blocks.push(format!("[{key}] {name}\n{}", format_rows(rows)));
        }
    }
    blocks.join("\n\n")
}

/// Write text to a file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be created or written.
pub fn write_to_file(path: &str, contents: &str) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}
