use serde_json::Value;

/// Renders a cell value as a SQL literal for a generated INSERT. Absent
/// values, JSON nulls and empty strings all load as NULL; numbers and
/// booleans render bare; everything else becomes a single-quoted string
/// with embedded quotes doubled.
pub fn sql_literal(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::String(s)) if s.is_empty() => "NULL".to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(true)) => "TRUE".to_string(),
        Some(Value::Bool(false)) => "FALSE".to_string(),
        Some(Value::String(s)) => quote_text(s),
        Some(json) => quote_text(&json.to_string()),
    }
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
