//! Plain-text and JSON rendering of session output.

use serde::{Deserialize, Serialize};
use sqlpad_storage::{QueryResult, ResultKind};
use std::time::Duration;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const NO_RESULT_YET: &str = "Run a query to see results";
pub const EMPTY_RESULT: &str = "Query executed successfully. No results to display.";
pub const NO_ROWS: &str = "Query returned no rows";
pub const NO_ERRORS: &str = "No errors to display";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RenderOptions {
    /// Cells wider than this many display columns are cut and end in `…`.
    pub max_cell_width: usize,
    pub max_rows: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_cell_width: 300,
            max_rows: None,
        }
    }
}

fn truncate_cell(value: &str, max_width: usize) -> String {
    let flat = value.replace(['\r', '\n'], " ");
    if flat.width() <= max_width {
        return flat;
    }
    if max_width == 0 {
        return String::new();
    }

    let budget = max_width - 1;
    let mut used = 0;
    let mut out = String::new();
    for ch in flat.chars() {
        let width = ch.width().unwrap_or(0);
        if used + width > budget {
            break;
        }
        used += width;
        out.push(ch);
    }
    out.push('…');
    out
}

fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
    let mut line = String::new();
    line.push(left);
    for (idx, width) in widths.iter().enumerate() {
        line.push_str(&"─".repeat(width + 2));
        line.push(if idx == widths.len() - 1 { right } else { mid });
    }
    line.push('\n');
    line
}

fn row_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("│");
    for (cell, width) in cells.iter().zip(widths) {
        let pad = width.saturating_sub(cell.width());
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(pad + 1));
        line.push('│');
    }
    line.push('\n');
    line
}

/// Render a result the way the results pane shows it.
pub fn render_result(result: &QueryResult, options: &RenderOptions) -> String {
    match result.kind() {
        ResultKind::Empty => return EMPTY_RESULT.to_string(),
        ResultKind::NoRows => return NO_ROWS.to_string(),
        ResultKind::Rows => {}
    }

    let shown = options
        .max_rows
        .map_or(result.rows.len(), |max| max.min(result.rows.len()));

    let header: Vec<String> = result
        .columns
        .iter()
        .map(|name| truncate_cell(name, options.max_cell_width))
        .collect();
    let body: Vec<Vec<String>> = result.rows[..shown]
        .iter()
        .map(|row| {
            row.iter()
                .map(|value| truncate_cell(&value.to_string(), options.max_cell_width))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|cell| cell.width()).collect();
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }

    let mut out = border(&widths, '┌', '┬', '┐');
    out.push_str(&row_line(&header, &widths));
    out.push_str(&border(&widths, '├', '┼', '┤'));
    for row in &body {
        out.push_str(&row_line(row, &widths));
    }
    out.push_str(&border(&widths, '└', '┴', '┘'));

    let total = result.rows.len();
    if shown < total {
        out.push_str(&format!("({shown} of {total} rows shown)"));
    } else {
        let label = if total == 1 { "row" } else { "rows" };
        out.push_str(&format!("({total} {label})"));
    }
    out
}

/// The results pane, including its placeholder before anything has run.
pub fn render_results_pane(result: Option<&QueryResult>, options: &RenderOptions) -> String {
    match result {
        Some(result) => render_result(result, options),
        None => NO_RESULT_YET.to_string(),
    }
}

pub fn render_errors_pane(error: Option<&str>) -> String {
    match error {
        Some(message) => render_error(message),
        None => NO_ERRORS.to_string(),
    }
}

pub fn render_error(message: &str) -> String {
    format!("Error: {message}")
}

pub fn render_timing(elapsed: Duration) -> String {
    format!("Execution time: {:.2}ms", elapsed.as_secs_f64() * 1000.0)
}

/// One JSON object for a successful run.
pub fn render_json_result(result: &QueryResult, elapsed: Option<Duration>) -> String {
    serde_json::json!({
        "columns": result.columns,
        "rows": result.rows,
        "elapsed_ms": elapsed.map(|d| d.as_secs_f64() * 1000.0),
    })
    .to_string()
}

pub fn render_json_error(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
