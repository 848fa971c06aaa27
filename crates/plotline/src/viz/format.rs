/// Column-name keywords that mark a metric as monetary. Matching is
/// case-insensitive and substring-based; the flag drives formatting only.
const CURRENCY_KEYWORDS: &[&str] = &[
    "sales",
    "revenue",
    "profit",
    "income",
    "cost",
    "price",
    "amount",
    "total sales",
    "gross",
    "net",
    "value",
    "margin",
    "budget",
    "spending",
];

pub fn is_currency_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    CURRENCY_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Format an axis or tooltip value. The short form folds magnitudes into
/// `K`/`M`; the long form always spells out grouped digits.
pub fn format_number(value: f64, field_name: &str, short: bool) -> String {
    let prefix = if is_currency_field(field_name) { "$" } else { "" };

    if short {
        if value >= 1_000_000.0 {
            return format!("{}{:.1}M", prefix, value / 1_000_000.0);
        }
        if value >= 1_000.0 {
            return format!("{}{:.0}K", prefix, value / 1_000.0);
        }
    }
    format!("{}{}", prefix, group_digits(value))
}

/// Grouped-digit rendering: thousands separators, up to three fractional
/// digits with trailing zeros dropped
fn group_digits(value: f64) -> String {
    let formatted = format!("{:.3}", value.abs());
    let (whole, fraction) = match formatted.split_once('.') {
        Some(parts) => parts,
        None => (formatted.as_str(), ""),
    };

    let mut grouped = String::new();
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let fraction = fraction.trim_end_matches('0');
    let mut out = String::new();
    if value < 0.0 {
        out.push('-');
    }
    out.push_str(&grouped);
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    out
}
