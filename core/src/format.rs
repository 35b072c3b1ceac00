//! Display formatting for individual field values.
//!
//! Rules are keyed off the field name: date-like names are rendered as
//! calendar dates, currency-like names as grouped amounts (`$1.234.567`),
//! booleans as `Activo`/`Inactivo`. Everything else passes through.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::model::numeric_value;

const DATE_TOKENS: &[&str] = &["fecha", "date", "vencimiento", "_at"];
const CURRENCY_TOKENS: &[&str] = &[
    "monto", "amount", "total", "valor", "precio", "price", "saldo", "importe",
];

pub const ACTIVE_LABEL: &str = "Activo";
pub const INACTIVE_LABEL: &str = "Inactivo";

pub fn is_date_field(field: &str) -> bool {
    let field = field.to_ascii_lowercase();
    DATE_TOKENS.iter().any(|token| field.contains(token))
}

pub fn is_currency_field(field: &str) -> bool {
    let field = field.to_ascii_lowercase();
    CURRENCY_TOKENS.iter().any(|token| field.contains(token))
}

/// Format `value` for display under `field`. `None` means the field should
/// not be shown at all (null or blank).
pub fn format_value(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => return None,
        Value::String(text) if text.trim().is_empty() => return None,
        _ => {}
    }

    if is_date_field(field) {
        if let Value::String(text) = value {
            return Some(format_date(text));
        }
    }

    if is_currency_field(field) {
        if let Some(amount) = numeric_value(value) {
            return Some(format_currency(amount));
        }
    }

    Some(match value {
        Value::Bool(flag) => format_bool(*flag).to_string(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    })
}

/// Reformat a timestamp or date string as `YYYY-MM-DD`; unparseable input
/// is returned unchanged.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format("%Y-%m-%d").to_string();
    }
    for pattern in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, pattern) {
            return parsed.format("%Y-%m-%d").to_string();
        }
    }
    for pattern in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
        if let Ok(parsed) = NaiveDate::parse_from_str(raw, pattern) {
            return parsed.format("%Y-%m-%d").to_string();
        }
    }

    raw.to_string()
}

/// `1234567.4` → `$1.234.567`. Amounts are rounded to whole units.
pub fn format_currency(amount: f64) -> String {
    let rounded = amount.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}${}", group_thousands(rounded.abs() as u64))
}

/// `1234.567` → `1.234,57`.
pub fn format_decimal(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{},{:02}", group_thousands(cents / 100), cents % 100)
}

/// Group digits in threes with `.` separators.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}

pub fn format_bool(flag: bool) -> &'static str {
    if flag { ACTIVE_LABEL } else { INACTIVE_LABEL }
}
