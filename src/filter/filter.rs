use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::{validate_column, FilterWhere};
use super::types::{Condition, Embed, FilterOrderInfo, SortDirection};
use crate::backend::Table;

/// Backend-neutral request filter: AND-ed conditions, ordering, embedded
/// relations and an optional limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
    order: Vec<FilterOrderInfo>,
    embeds: Vec<Embed>,
    limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for the common primary-key lookup.
    pub fn by_id(id: impl ToString) -> Self {
        Self::new().eq("id", Value::String(id.to_string()))
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn any_ilike(mut self, columns: &[&str], term: &str) -> Self {
        self.conditions.push(Condition::AnyILike {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            term: term.to_string(),
        });
        self
    }

    pub fn order(mut self, column: &str, sort: SortDirection) -> Self {
        self.order.push(FilterOrderInfo {
            column: column.to_string(),
            sort,
        });
        self
    }

    pub fn embed(mut self, alias: &str, table: Table, foreign_key: &str) -> Self {
        self.embeds.push(Embed {
            alias: alias.to_string(),
            table,
            foreign_key: foreign_key.to_string(),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order_by(&self) -> &[FilterOrderInfo] {
        &self.order
    }

    pub fn embeds(&self) -> &[Embed] {
        &self.embeds
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        for condition in &self.conditions {
            FilterWhere::validate(condition)?;
        }
        for info in &self.order {
            validate_column(&info.column)?;
        }
        for embed in &self.embeds {
            validate_column(&embed.alias).map_err(|_| FilterError::InvalidAlias(embed.alias.clone()))?;
            validate_column(&embed.foreign_key)?;
        }
        if self.limit == Some(0) {
            return Err(FilterError::InvalidLimit("Limit must be positive".to_string()));
        }
        Ok(())
    }

    /// PostgREST `select` clause including embedded relations.
    pub fn select_clause(&self) -> String {
        let mut parts = vec!["*".to_string()];
        for embed in &self.embeds {
            parts.push(format!("{}:{}(*)", embed.alias, embed.table.as_str()));
        }
        parts.join(",")
    }

    /// Encode as PostgREST query parameters.
    pub fn to_query_pairs(&self) -> Result<Vec<(String, String)>, FilterError> {
        self.validate()?;

        let mut pairs = vec![("select".to_string(), self.select_clause())];
        pairs.extend(self.conditions.iter().map(FilterWhere::encode));
        if let Some(order) = FilterOrder::generate(&self.order) {
            pairs.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        Ok(pairs)
    }

    /// Only the row-selecting parameters, for PATCH and DELETE requests.
    pub fn to_where_pairs(&self) -> Result<Vec<(String, String)>, FilterError> {
        self.validate()?;
        Ok(self.conditions.iter().map(FilterWhere::encode).collect())
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| FilterWhere::matches(c, row))
    }

    /// Apply conditions, ordering and limit to in-process rows.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows.into_iter().filter(|r| self.matches(r)).collect();
        if !self.order.is_empty() {
            out.sort_by(|a, b| FilterOrder::compare(&self.order, a, b));
        }
        if let Some(limit) = self.limit {
            out.truncate(limit);
        }
        out
    }
}
