use serde_json::Value;

use crate::format::{format_currency, format_decimal, group_thousands};
use crate::model::{QueryResult, Record, numeric_value};
use crate::present::{Redaction, present_record};

pub const NO_RECORDS_MESSAGE: &str = "No se encontraron registros que coincidan con tu consulta.";
pub const EMPTY_RECORD_PLACEHOLDER: &str = "(sin datos visibles)";
pub const MAX_LISTED_RECORDS: usize = 10;
const FIELD_SEPARATOR: &str = " | ";

const COUNT_KEYS: &[&str] = &["count", "cantidad", "total_registros"];
const TOTAL_KEYS: &[&str] = &["total", "sum", "suma"];
const AVERAGE_KEYS: &[&str] = &["average", "avg", "promedio"];

/// Turn a query result into the final answer text.
pub fn compose_answer(question: &str, result: &QueryResult, redaction: &Redaction) -> String {
    if result.rows.is_empty() {
        return NO_RECORDS_MESSAGE.to_string();
    }

    if let Some((key, amount)) = single_numeric_field(result) {
        if COUNT_KEYS.contains(&key.as_str()) {
            let count = amount.max(0.0).round() as u64;
            return format!("Se encontraron {} registro(s).", group_thousands(count));
        }
        if TOTAL_KEYS.contains(&key.as_str()) {
            return format!("El total es {}.", format_currency(amount));
        }
        if AVERAGE_KEYS.contains(&key.as_str()) {
            return format!("El promedio es {}.", format_decimal(amount));
        }
    }

    compose_listing(question, result, redaction)
}

/// `(key, value)` when the result is exactly one row with one numeric field.
fn single_numeric_field(result: &QueryResult) -> Option<(String, f64)> {
    let [row] = result.rows.as_slice() else {
        return None;
    };
    if row.len() != 1 {
        return None;
    }
    let (key, value) = row.iter().next()?;
    let amount = numeric_value(value).or_else(|| match value {
        Value::Null => result.scalar,
        _ => None,
    })?;
    Some((key.to_ascii_lowercase(), amount))
}

fn compose_listing(question: &str, result: &QueryResult, redaction: &Redaction) -> String {
    let total = result.row_count.max(result.rows.len() as u64);
    let question = question.trim();

    let mut lines = Vec::with_capacity(MAX_LISTED_RECORDS + 2);
    if question.is_empty() {
        lines.push(format!("Encontré {total} registro(s):"));
    } else {
        lines.push(format!("Encontré {total} registro(s) para \"{question}\":"));
    }

    for (idx, record) in result.rows.iter().take(MAX_LISTED_RECORDS).enumerate() {
        lines.push(format!("{}. {}", idx + 1, render_record(record, redaction)));
    }

    let shown = result.rows.len().min(MAX_LISTED_RECORDS) as u64;
    if total > shown {
        lines.push(format!(
            "… y {} registro(s) más (total: {}).",
            total - shown,
            total
        ));
    }

    lines.join("\n")
}

fn render_record(record: &Record, redaction: &Redaction) -> String {
    let fields = present_record(record, redaction);
    if fields.is_empty() {
        return EMPTY_RECORD_PLACEHOLDER.to_string();
    }
    fields
        .iter()
        .map(|field| format!("{}: {}", field.label, field.value))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}
