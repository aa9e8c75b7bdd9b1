//! Form schemas checked before any backend call.

use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::models::{CategoryInsert, CategoryUpdate, HexColor, PromptInsert, PromptUpdate};
use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_CATEGORY_NAME_LEN: usize = 2;
pub const MIN_TITLE_LEN: usize = 3;
pub const MIN_CONTENT_LEN: usize = 10;

/// Collects per-field messages and turns them into one validation error.
#[derive(Debug, Default)]
struct FieldErrors(HashMap<String, String>);

impl FieldErrors {
    fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.0.entry(field.to_string()).or_insert(message);
        }
    }

    fn finish(self) -> AppResult<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => {
                let message = self.0.values().next().cloned().unwrap_or_default();
                Err(AppError::validation(message, self.0))
            }
            n => Err(AppError::validation(format!("{} fields are invalid", n), self.0)),
        }
    }
}

fn check_email(input: &str, domain: Option<&str>) -> Result<(), String> {
    let Some((local, host)) = input.split_once('@') else {
        return Err("Invalid email address".to_string());
    };
    let well_formed = !local.is_empty()
        && !host.contains('@')
        && host.contains('.')
        && !host.starts_with('.')
        && !host.ends_with('.')
        && !input.chars().any(char::is_whitespace);
    if !well_formed {
        return Err("Invalid email address".to_string());
    }
    if let Some(domain) = domain {
        if !host.eq_ignore_ascii_case(domain) {
            return Err(format!("Email must be a @{} address", domain));
        }
    }
    Ok(())
}

fn check_min_len(value: &str, min: usize, label: &str) -> Result<(), String> {
    if value.trim().chars().count() < min {
        Err(format!("{} must be at least {} characters", label, min))
    } else {
        Ok(())
    }
}

// Passwords are sent verbatim, so surrounding spaces count toward the length
fn check_password(value: &str) -> Result<(), String> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        Err(format!("Password must be at least {} characters", MIN_PASSWORD_LEN))
    } else {
        Ok(())
    }
}

/// Trimmed email, optionally restricted to one domain.
pub fn email(input: &str, domain: Option<&str>) -> AppResult<String> {
    let trimmed = input.trim();
    check_email(trimmed, domain).map_err(|m| AppError::invalid_field("email", m))?;
    Ok(trimmed.to_string())
}

pub fn password(input: &str) -> AppResult<()> {
    check_password(input).map_err(|m| AppError::invalid_field("password", m))
}

/// Email and password together, reporting both fields at once.
pub fn credentials(email: &str, password: &str, domain: Option<&str>) -> AppResult<String> {
    let trimmed = email.trim();
    let mut errors = FieldErrors::default();
    errors.check("email", check_email(trimmed, domain));
    errors.check("password", check_password(password));
    errors.finish()?;
    Ok(trimmed.to_string())
}

/// Split a comma-separated tag list, trimming and dropping empties.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn blank_to_none(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryForm {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    pub color: HexColor,
}

impl CategoryForm {
    pub fn validate(&self) -> AppResult<CategoryDraft> {
        let mut errors = FieldErrors::default();
        errors.check("name", check_min_len(&self.name, MIN_CATEGORY_NAME_LEN, "Name"));
        let color = self.color.trim().parse::<HexColor>();
        if color.is_err() {
            errors.check("color", Err("Must be a valid hex color".to_string()));
        }
        errors.finish()?;

        Ok(CategoryDraft {
            name: self.name.trim().to_string(),
            description: blank_to_none(self.description.as_deref()),
            color: color.map_err(|e| AppError::invalid_field("color", e.to_string()))?,
        })
    }
}

impl CategoryDraft {
    pub fn into_insert(self, created_by: Uuid) -> CategoryInsert {
        CategoryInsert {
            name: self.name,
            description: self.description,
            color: self.color,
            created_by,
        }
    }

    pub fn into_update(self) -> CategoryUpdate {
        CategoryUpdate {
            name: Some(self.name),
            description: Some(self.description),
            color: Some(self.color),
        }
    }
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptForm {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub prompt_content: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// Comma-separated
    #[serde(default)]
    pub tags: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

impl Default for PromptForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: None,
            prompt_content: String::new(),
            category_id: None,
            tags: String::new(),
            is_public: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptDraft {
    pub title: String,
    pub description: Option<String>,
    pub prompt_content: String,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_public: bool,
}

impl PromptForm {
    pub fn validate(&self) -> AppResult<PromptDraft> {
        let mut errors = FieldErrors::default();
        errors.check("title", check_min_len(&self.title, MIN_TITLE_LEN, "Title"));
        errors.check(
            "prompt_content",
            check_min_len(&self.prompt_content, MIN_CONTENT_LEN, "Prompt content"),
        );
        errors.finish()?;

        Ok(PromptDraft {
            title: self.title.trim().to_string(),
            description: blank_to_none(self.description.as_deref()),
            prompt_content: self.prompt_content.clone(),
            category_id: self.category_id,
            tags: parse_tags(&self.tags),
            is_public: self.is_public,
        })
    }
}

impl PromptDraft {
    pub fn into_insert(self, created_by: Uuid) -> PromptInsert {
        PromptInsert {
            title: self.title,
            description: self.description,
            prompt_content: self.prompt_content,
            category_id: self.category_id,
            tags: self.tags,
            is_public: self.is_public,
            created_by,
        }
    }

    pub fn into_update(self) -> PromptUpdate {
        PromptUpdate {
            title: Some(self.title),
            description: Some(self.description),
            prompt_content: Some(self.prompt_content),
            category_id: Some(self.category_id),
            tags: Some(self.tags),
            is_public: Some(self.is_public),
            updated_at: None,
        }
    }
}
