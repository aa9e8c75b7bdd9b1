use serde_json::Value;

use super::error::FilterError;
use super::types::Condition;

pub struct FilterWhere;

impl FilterWhere {
    pub fn validate(condition: &Condition) -> Result<(), FilterError> {
        match condition {
            Condition::Eq { column, .. } => validate_column(column),
            Condition::AnyILike { columns, term } => {
                if term.is_empty() {
                    return Err(FilterError::EmptySearchTerm);
                }
                columns.iter().try_for_each(|c| validate_column(c))
            }
        }
    }

    /// Encode one condition as a PostgREST query pair.
    pub fn encode(condition: &Condition) -> (String, String) {
        match condition {
            Condition::Eq { column, value } => {
                let rhs = match value {
                    Value::Null => "is.null".to_string(),
                    other => format!("eq.{}", scalar(other)),
                };
                (column.clone(), rhs)
            }
            Condition::AnyILike { columns, term } => {
                let pattern = quote(&format!("*{}*", escape_like(term)));
                let parts: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{}.ilike.{}", c, pattern))
                    .collect();
                ("or".to_string(), format!("({})", parts.join(",")))
            }
        }
    }

    /// Evaluate one condition against a JSON row.
    pub fn matches(condition: &Condition, row: &Value) -> bool {
        match condition {
            Condition::Eq { column, value } => {
                let actual = row.get(column).unwrap_or(&Value::Null);
                actual == value
            }
            Condition::AnyILike { columns, term } => {
                let needle = term.to_lowercase();
                columns.iter().any(|c| {
                    row.get(c)
                        .and_then(Value::as_str)
                        .map(|s| s.to_lowercase().contains(&needle))
                        .unwrap_or(false)
                })
            }
        }
    }
}

pub(crate) fn validate_column(column: &str) -> Result<(), FilterError> {
    let mut chars = column.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(FilterError::InvalidColumn(column.to_string()))
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Search terms match literally: LIKE's own wildcards are escaped.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// Double-quoted values keep PostgREST's reserved characters (`,.:()`) literal.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
