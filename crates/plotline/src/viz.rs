//! Visualization inference: turn accumulated tool results (or a markdown
//! table in the answer text) into render-ready chart descriptions.
//!
//! Everything here is a pure function of its input rows; charts are rebuilt
//! from scratch on every render and never mutated in place.
pub mod chart;
pub mod format;
pub mod table;

pub use chart::{detect_chart, Chart, ChartType};
pub use format::{format_number, is_currency_field};
pub use table::{parse_markdown_table, parse_table_data, Record};

use crate::models::tool::ToolOutcome;

/// Derive charts for a finished turn: every charted tool result wins, and a
/// markdown table in the response text is the fallback when no tool result
/// produced one. Tools with "pulse" in their name ship their own bundled
/// visualizations and are skipped here.
pub fn charts_for_turn(tool_results: &[ToolOutcome], response_text: Option<&str>) -> Vec<Chart> {
    let mut charts = Vec::new();

    for outcome in tool_results {
        if outcome.tool.contains("pulse") {
            continue;
        }
        let payload = match &outcome.result {
            Some(payload) => payload,
            None => continue,
        };
        if let Some(rows) = parse_table_data(payload) {
            if rows.len() > 1 {
                if let Some(chart) = detect_chart(&rows) {
                    charts.push(chart);
                }
            }
        }
    }

    if charts.is_empty() {
        if let Some(text) = response_text {
            if let Some(rows) = parse_markdown_table(text) {
                if rows.len() > 1 {
                    if let Some(chart) = detect_chart(&rows) {
                        charts.push(chart);
                    }
                }
            }
        }
    }

    charts
}
