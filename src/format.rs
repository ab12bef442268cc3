//! Presentation of result cells.

use crate::engine::{CellValue, QueryRows};
use serde_json::{Map, Value};

/// Column whose numbers are shown as money.
const MONEY_COLUMN: &str = "salary";

/// Format an amount as `1 234 567,89`.
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{},{}", sign, grouped, frac_part)
}

/// JSON value shown for one cell of `column`.
pub fn format_cell(column: &str, cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Int(n) if column == MONEY_COLUMN => Value::String(format_money(*n as f64)),
        CellValue::Float(n) if column == MONEY_COLUMN => Value::String(format_money(*n)),
        CellValue::Int(n) => Value::from(*n),
        CellValue::Float(n) => Value::from(*n),
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
    }
}

/// Rows as column-name keyed objects, columns in result order.
pub fn format_rows(rows: &QueryRows) -> Vec<Map<String, Value>> {
    rows.rows
        .iter()
        .map(|row| {
            rows.columns
                .iter()
                .zip(row)
                .map(|(col, cell)| (col.clone(), format_cell(col, cell)))
                .collect()
        })
        .collect()
}

/// Plain text of a formatted value for table output.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
