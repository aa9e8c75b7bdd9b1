use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Category, Profile};
use crate::filter::Filter;

/// Columns searched by [`PromptFilters::search`].
pub const SEARCH_COLUMNS: [&str; 3] = ["title", "description", "prompt_content"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub prompt_content: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_public: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub usage_count: i64,
}

/// A prompt with its category and author embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptWithDetails {
    #[serde(flatten)]
    pub prompt: Prompt,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

impl PromptWithDetails {
    pub fn is_owned_by(&self, profile_id: Uuid) -> bool {
        self.prompt.created_by == profile_id
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.prompt.tags.contains(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptInsert {
    pub title: String,
    pub description: Option<String>,
    pub prompt_content: String,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PromptUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Backend-side listing filters, AND-ed together. Tags are filtered by the
/// caller with [`filter_by_tags`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFilters {
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

impl PromptFilters {
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(category_id) = self.category_id {
            filter = filter.eq("category_id", category_id.to_string());
        }
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            filter = filter.any_ilike(&SEARCH_COLUMNS, term);
        }
        if let Some(is_public) = self.is_public {
            filter = filter.eq("is_public", is_public);
        }
        if let Some(created_by) = self.created_by {
            filter = filter.eq("created_by", created_by.to_string());
        }
        filter
    }
}

/// Keep prompts carrying at least one of `selected`. An empty selection
/// keeps everything.
pub fn filter_by_tags(prompts: Vec<PromptWithDetails>, selected: &[String]) -> Vec<PromptWithDetails> {
    if selected.is_empty() {
        return prompts;
    }
    prompts.into_iter().filter(|p| p.has_any_tag(selected)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use serde_json::json;

    fn prompt(tags: &[&str]) -> PromptWithDetails {
        serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "title": "Summarize",
            "description": null,
            "prompt_content": "Summarize the following text",
            "category_id": null,
            "tags": tags,
            "is_public": true,
            "created_by": Uuid::new_v4(),
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z",
            "usage_count": 0,
            "category": null,
            "profile": null,
        }))
        .unwrap()
    }

    #[test]
    fn tag_filter_uses_or_semantics() {
        let prompts = vec![prompt(&["a"]), prompt(&["b"]), prompt(&["c"])];
        let kept = filter_by_tags(prompts, &["a".to_string(), "b".to_string()]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn empty_tag_selection_keeps_all() {
        let prompts = vec![prompt(&["a"]), prompt(&[])];
        assert_eq!(filter_by_tags(prompts, &[]).len(), 2);
    }

    #[test]
    fn filters_compose_and_skip_blank_search() {
        let category = Uuid::new_v4();
        let filter = PromptFilters {
            category_id: Some(category),
            search: Some("   ".into()),
            is_public: Some(true),
            created_by: None,
        }
        .to_filter();
        assert_eq!(filter.conditions().len(), 2);
        assert!(filter
            .conditions()
            .iter()
            .all(|c| matches!(c, Condition::Eq { .. })));
    }

    #[test]
    fn search_targets_three_columns() {
        let filter = PromptFilters {
            search: Some("Email".into()),
            ..Default::default()
        }
        .to_filter();
        match &filter.conditions()[0] {
            Condition::AnyILike { columns, term } => {
                assert_eq!(columns.len(), 3);
                assert_eq!(term, "Email");
            }
            other => panic!("unexpected condition {:?}", other),
        }
    }
}
