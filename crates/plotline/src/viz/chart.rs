use std::cmp::Ordering;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::format::is_currency_field;
use super::table::{number_value, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    GroupedBar,
}

/// A fully-resolved, render-ready chart description. Derived and stateless:
/// rebuilt from the latest tool results on every render, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: Vec<Record>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub y_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value_key: Option<String>,
    /// Grouping column for differently-colored bar series
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub series_key: Option<String>,
    /// Pivoted rows for a grouped bar chart, one per distinct axis value
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub grouped_data: Option<Vec<Record>>,
    pub is_currency: bool,
}

/// Pick a chart for the given rows, or `None` when no sensible chart exists
/// (fewer than two columns, or nothing numeric to plot).
///
/// Columns are classified as numeric, date or categorical by cascading
/// keyword/pattern rules, then the first matching shape wins: grouped bars
/// for date + category + sales-like metric, a line for a plain time series,
/// a pie for a small categorical breakdown, bars otherwise.
pub fn detect_chart(data: &[Record]) -> Option<Chart> {
    if data.is_empty() {
        return None;
    }

    let keys: Vec<String> = data[0].keys().cloned().collect();
    if keys.len() < 2 {
        return None;
    }

    let numeric_keys: Vec<String> = keys
        .iter()
        .filter(|key| column_is_numeric(data, key))
        .cloned()
        .collect();
    let date_keys: Vec<String> = keys
        .iter()
        .filter(|key| column_is_date(data, key))
        .cloned()
        .collect();
    let categorical_keys: Vec<String> = keys
        .iter()
        .filter(|key| !numeric_keys.contains(key) && !date_keys.contains(key))
        .cloned()
        .collect();

    let sales_columns = filter_by_name(&numeric_keys, SALES_KEYWORDS);
    let time_columns = filter_by_name(&date_keys, TIME_KEYWORDS);
    let category_columns = filter_by_name(&categorical_keys, CATEGORY_KEYWORDS);

    // A time axis always wins when any metric is available
    if !time_columns.is_empty() && !numeric_keys.is_empty() {
        let x_key = time_columns[0].clone();
        let y_key = sales_columns
            .first()
            .unwrap_or(&numeric_keys[0])
            .clone();

        if !category_columns.is_empty() && !sales_columns.is_empty() {
            return Some(grouped_bar_chart(data, &x_key, &y_key, &category_columns[0]));
        }
        return Some(axis_chart(ChartType::Line, data, &x_key, &y_key, &date_keys));
    }

    // Small categorical breakdown of a sales-like metric
    if !category_columns.is_empty() && !sales_columns.is_empty() && data.len() <= 8 {
        return Some(pie_chart(data, &category_columns[0], &sales_columns[0]));
    }

    if !category_columns.is_empty() && !numeric_keys.is_empty() {
        let x_key = category_columns[0].clone();
        let y_key = sales_columns
            .first()
            .unwrap_or(&numeric_keys[0])
            .clone();
        return Some(axis_chart(ChartType::Bar, data, &x_key, &y_key, &date_keys));
    }

    if !numeric_keys.is_empty() {
        let x_key = keys
            .iter()
            .find(|key| !numeric_keys.contains(key))
            .unwrap_or(&keys[0])
            .clone();
        let y_key = sales_columns
            .first()
            .unwrap_or(&numeric_keys[0])
            .clone();
        return Some(axis_chart(ChartType::Bar, data, &x_key, &y_key, &date_keys));
    }

    None
}

const SALES_KEYWORDS: &str = r"(?i)sales|revenue|amount|total|quantity|count|profit";
const TIME_KEYWORDS: &str = r"(?i)date|time|year|month|quarter|period";
const CATEGORY_KEYWORDS: &str = r"(?i)product|category|type|name|region|customer|model";
const DATE_NAME_KEYWORDS: &str = r"(?i)date|time|year|month|quarter|period|day|week";

fn filter_by_name(keys: &[String], pattern: &str) -> Vec<String> {
    let re = Regex::new(pattern).unwrap();
    keys.iter()
        .filter(|key| re.is_match(key))
        .cloned()
        .collect()
}

/// A column is numeric when at least one non-empty value is a number, or a
/// string that survives stripping `$`, `,`, `%` and whitespace.
fn column_is_numeric(data: &[Record], key: &str) -> bool {
    data.iter()
        .filter_map(|row| row.get(key))
        .filter(|value| !value.is_null() && value.as_str() != Some(""))
        .any(|value| numeric_value_of(value).is_some())
}

/// A column is a date axis when its name sounds like one and at least one
/// value is a plausible year or date text, or — name aside — when a value
/// matches one of the recognized date text patterns.
fn column_is_date(data: &[Record], key: &str) -> bool {
    let name_is_dateish = Regex::new(DATE_NAME_KEYWORDS).unwrap().is_match(key);

    if name_is_dateish {
        data.iter().filter_map(|row| row.get(key)).any(|value| match value {
            Value::Number(n) => n
                .as_f64()
                .map(|year| (1900.0..=2100.0).contains(&year))
                .unwrap_or(false),
            Value::String(s) => looks_like_date_text(s),
            _ => false,
        })
    } else {
        data.iter()
            .filter_map(|row| row.get(key))
            .any(|value| value.as_str().map(looks_like_date_text).unwrap_or(false))
    }
}

fn looks_like_date_text(value: &str) -> bool {
    let patterns = [
        r"^\d{4}$",             // bare year
        r"\d{4}-\d{2}-\d{2}",   // ISO date
        r"\d{1,2}/\d{1,2}/\d{4}", // MM/DD/YYYY
        r"\d{4}-\d{2}",         // ISO year-month
        r"\w+ \d{4}",           // Month YYYY
        r"Q[1-4] \d{4}",        // quarter
    ];
    patterns
        .iter()
        .any(|pattern| Regex::new(pattern).unwrap().is_match(value))
}

fn clean_numeric_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '$' | ',' | '%') && !c.is_whitespace())
        .collect()
}

fn numeric_value_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = clean_numeric_text(s);
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        }
        _ => None,
    }
}

/// Strip formatting and parse, defaulting to zero on failure
fn clean_number(value: &Value) -> f64 {
    numeric_value_of(value).unwrap_or(0.0)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Chronological tie-break: numeric comparison when both sides are numbers,
/// date comparison when both parse as dates, lexical otherwise. Stable and
/// idempotent under `sort_by`.
fn compare_axis_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (parse_date_value(x), parse_date_value(y)) {
                (Some(dx), Some(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        _ => stringify(a).cmp(&stringify(b)),
    }
}

fn parse_date_value(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    if Regex::new(r"^\d{4}$").unwrap().is_match(text) {
        let year: i32 = text.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%m/%d/%Y") {
        return Some(date);
    }
    if Regex::new(r"^\d{4}-\d{2}$").unwrap().is_match(text) {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d") {
            return Some(date);
        }
    }
    for format in ["%d %B %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {}", text), format) {
            return Some(date);
        }
    }
    None
}

fn has_axis_value(row: &Record, key: &str) -> bool {
    row.get(key).map(|value| !value.is_null()).unwrap_or(false)
}

fn clean_in_place(row: &mut Record, y_key: &str) {
    if let Some(value) = row.get(y_key) {
        if !value.is_null() {
            let cleaned = clean_number(value);
            row.insert(y_key.to_string(), number_value(cleaned));
        }
    }
}

fn axis_chart(
    chart_type: ChartType,
    data: &[Record],
    x_key: &str,
    y_key: &str,
    date_keys: &[String],
) -> Chart {
    let mut rows: Vec<Record> = data
        .iter()
        .filter(|row| has_axis_value(row, x_key))
        .cloned()
        .collect();
    for row in &mut rows {
        clean_in_place(row, y_key);
    }

    if date_keys.iter().any(|key| key == x_key) {
        rows.sort_by(|a, b| {
            compare_axis_values(
                a.get(x_key).unwrap_or(&Value::Null),
                b.get(x_key).unwrap_or(&Value::Null),
            )
        });
    }

    Chart {
        chart_type,
        title: format!("{} vs {}", x_key, y_key),
        data: rows,
        x_key: Some(x_key.to_string()),
        y_key: Some(y_key.to_string()),
        name_key: None,
        value_key: None,
        series_key: None,
        grouped_data: None,
        is_currency: is_currency_field(y_key),
    }
}

fn grouped_bar_chart(data: &[Record], x_key: &str, y_key: &str, series_key: &str) -> Chart {
    let mut cleaned: Vec<Record> = data
        .iter()
        .filter(|row| has_axis_value(row, x_key))
        .cloned()
        .collect();
    for row in &mut cleaned {
        clean_in_place(row, y_key);
    }
    cleaned.sort_by(|a, b| {
        compare_axis_values(
            a.get(x_key).unwrap_or(&Value::Null),
            b.get(x_key).unwrap_or(&Value::Null),
        )
    });

    // Pivot into one row per distinct axis value, one field per series value
    let mut grouped: Vec<Record> = Vec::new();
    for row in &cleaned {
        let x_value = stringify(row.get(x_key).unwrap_or(&Value::Null));
        let series_value = stringify(row.get(series_key).unwrap_or(&Value::Null));
        let y_value = row.get(y_key).cloned().unwrap_or(Value::Null);

        let position = grouped
            .iter()
            .position(|entry| entry.get(x_key).and_then(|v| v.as_str()) == Some(x_value.as_str()));
        let entry = match position {
            Some(index) => &mut grouped[index],
            None => {
                let mut record = Record::new();
                record.insert(x_key.to_string(), Value::String(x_value.clone()));
                grouped.push(record);
                grouped.last_mut().unwrap()
            }
        };
        entry.insert(series_value, y_value);
    }

    grouped.sort_by(|a, b| {
        compare_axis_values(
            a.get(x_key).unwrap_or(&Value::Null),
            b.get(x_key).unwrap_or(&Value::Null),
        )
    });

    Chart {
        chart_type: ChartType::GroupedBar,
        title: format!("{} by {} and {}", y_key, x_key, series_key),
        data: cleaned,
        x_key: Some(x_key.to_string()),
        y_key: Some(y_key.to_string()),
        name_key: None,
        value_key: None,
        series_key: Some(series_key.to_string()),
        grouped_data: Some(grouped),
        is_currency: is_currency_field(y_key),
    }
}

fn pie_chart(data: &[Record], category_key: &str, sales_key: &str) -> Chart {
    let mut slices: Vec<Record> = Vec::new();

    for row in data {
        let category = match row.get(category_key) {
            Some(value) if !value.is_null() => value,
            _ => continue,
        };
        let name = stringify(category);
        // one slice per distinct category, first occurrence wins
        if slices
            .iter()
            .any(|slice| slice.get("name").and_then(|v| v.as_str()) == Some(name.as_str()))
        {
            continue;
        }

        let value = row.get(sales_key).map(clean_number).unwrap_or(0.0);
        let mut slice = Record::new();
        slice.insert("name".to_string(), Value::String(name));
        slice.insert("value".to_string(), number_value(value));
        slices.push(slice);
    }

    Chart {
        chart_type: ChartType::Pie,
        title: format!("{} by {}", category_key, sales_key),
        data: slices,
        x_key: None,
        y_key: None,
        name_key: Some("name".to_string()),
        value_key: Some("value".to_string()),
        series_key: None,
        grouped_data: None,
        is_currency: is_currency_field(sales_key),
    }
}
