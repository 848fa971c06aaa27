use regex::Regex;
use serde_json::{Map, Value};

/// One table row: an ordered mapping from column name to scalar value
pub type Record = Map<String, Value>;

/// Normalize an opaque tool payload into table rows.
///
/// Recognized shapes are tried in order, first match wins: a text envelope
/// wrapping a JSON string, an object carrying a row array under a known key,
/// a columnar object with parallel `columns`/`data` arrays, a bare array of
/// rows, a single row object, or a string (JSON, else comma-delimited with a
/// header line). Anything else, and any parse failure, is `None` — the
/// caller treats that as "no chart available", never as an error.
pub fn parse_table_data(content: &Value) -> Option<Vec<Record>> {
    match content {
        Value::Array(items) if is_text_envelope(items) => {
            let text = items[0].get("text")?.as_str()?;
            let parsed: Value = serde_json::from_str(text).ok()?;
            parse_table_data(&parsed)
        }
        Value::Array(items) => rows_from_array(items),
        Value::Object(map) => {
            for key in ["tuples", "data", "rows", "results"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    if let Some(rows) = rows_from_array(items) {
                        return Some(rows);
                    }
                }
            }

            if let (Some(Value::Array(columns)), Some(Value::Array(data))) =
                (map.get("columns"), map.get("data"))
            {
                if let Some(rows) = zip_columns(columns, data) {
                    return Some(rows);
                }
            }

            if map.is_empty() {
                None
            } else {
                Some(vec![map.clone()])
            }
        }
        Value::String(text) => {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                return parse_table_data(&parsed);
            }
            parse_delimited(text)
        }
        _ => None,
    }
}

/// The result envelope tool servers wrap tabular payloads in:
/// `[{type: "text", text: "<json>"}]`
fn is_text_envelope(items: &[Value]) -> bool {
    items
        .first()
        .map(|item| {
            item.get("type").and_then(|t| t.as_str()) == Some("text")
                && item.get("text").and_then(|t| t.as_str()).is_some()
        })
        .unwrap_or(false)
}

/// Accept an array as rows when it is non-empty and every element is an
/// object; anything else cannot carry column names.
fn rows_from_array(items: &[Value]) -> Option<Vec<Record>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_object().cloned())
        .collect::<Option<Vec<Record>>>()
}

/// Zip a columnar `columns` + `data` pair into row records
fn zip_columns(columns: &[Value], data: &[Value]) -> Option<Vec<Record>> {
    let names: Vec<&str> = columns.iter().filter_map(|c| c.as_str()).collect();
    if names.len() != columns.len() || names.is_empty() {
        return None;
    }

    let mut rows = Vec::new();
    for item in data {
        let values = item.as_array()?;
        let mut record = Record::new();
        for (index, name) in names.iter().enumerate() {
            if let Some(value) = values.get(index) {
                record.insert(name.to_string(), value.clone());
            }
        }
        rows.push(record);
    }
    Some(rows)
}

/// Comma-delimited text: first line is headers, remaining non-blank lines
/// are rows, numeric-looking cells become numbers.
fn parse_delimited(text: &str) -> Option<Vec<Record>> {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.len() < 2 {
        return None;
    }

    let headers: Vec<&str> = lines[0].split(',').map(str::trim).collect();
    let rows: Vec<Record> = lines[1..]
        .iter()
        .map(|line| {
            let mut record = Record::new();
            for (index, cell) in line.split(',').map(str::trim).enumerate() {
                if index < headers.len() {
                    record.insert(headers[index].to_string(), coerce_cell(cell));
                }
            }
            record
        })
        .filter(|record| !record.is_empty())
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

/// Extract a GitHub-flavored-markdown pipe table embedded in prose.
///
/// Matches a header row, a separator row, and at least one data row;
/// leading/trailing empty pipe cells are stripped, and `$`-prefixed or plain
/// numeric cells are coerced to numbers.
pub fn parse_markdown_table(text: &str) -> Option<Vec<Record>> {
    let table = Regex::new(r"\|(.+)\|\s*\n\s*\|[\s\-\|:]+\|\s*\n((?:\s*\|.+\|\s*\n?)+)").unwrap();
    let captures = table.captures(text)?;

    let headers: Vec<&str> = captures
        .get(1)?
        .as_str()
        .split('|')
        .map(str::trim)
        .filter(|header| !header.is_empty())
        .collect();
    if headers.is_empty() {
        return None;
    }

    let rows: Vec<Record> = captures
        .get(2)?
        .as_str()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut cells: Vec<&str> = line.split('|').map(str::trim).collect();
            if cells.first() == Some(&"") {
                cells.remove(0);
            }
            if cells.last() == Some(&"") {
                cells.pop();
            }

            let mut record = Record::new();
            for (index, header) in headers.iter().enumerate() {
                if let Some(cell) = cells.get(index) {
                    record.insert(header.to_string(), coerce_markdown_cell(cell));
                }
            }
            record
        })
        .filter(|record| !record.is_empty())
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(rows)
    }
}

fn coerce_cell(cell: &str) -> Value {
    match cell.parse::<f64>() {
        Ok(number) if number.is_finite() => number_value(number),
        _ => Value::String(cell.to_string()),
    }
}

fn coerce_markdown_cell(cell: &str) -> Value {
    if let Some(rest) = cell.strip_prefix('$') {
        let cleaned: String = rest.chars().filter(|c| *c != ',').collect();
        return match cleaned.parse::<f64>() {
            Ok(number) if number.is_finite() => number_value(number),
            _ => Value::String(cell.to_string()),
        };
    }
    if cell.is_empty() {
        return Value::String(String::new());
    }
    coerce_cell(cell)
}

/// Prefer integer JSON numbers when the value is whole, so rows read
/// naturally downstream
pub(crate) fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}
