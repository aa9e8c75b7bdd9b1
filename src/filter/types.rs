use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Table;

/// Single row predicate. A filter's conditions combine with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact match; `Value::Null` matches missing or null columns.
    Eq { column: String, value: Value },
    /// Case-insensitive substring match on at least one of the columns.
    AnyILike { columns: Vec<String>, term: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

/// Related row embedded into each result under `alias`, joined through
/// `foreign_key` on the base row.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub alias: String,
    pub table: Table,
    pub foreign_key: String,
}
