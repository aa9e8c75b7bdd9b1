use std::sync::Arc;
use uuid::Uuid;

use super::require_admin;
use crate::auth::SessionManager;
use crate::database::{Category, CategoryRepository};
use crate::error::AppResult;
use crate::filter::Filter;
use crate::validation::CategoryForm;

#[derive(Clone)]
pub struct CategoryService {
    categories: CategoryRepository,
    session: Arc<SessionManager>,
}

impl CategoryService {
    pub fn new(categories: CategoryRepository, session: Arc<SessionManager>) -> Self {
        Self { categories, session }
    }

    pub async fn list(&self) -> AppResult<Vec<Category>> {
        self.categories.list(Filter::new()).await
    }

    pub async fn create(&self, form: &CategoryForm) -> AppResult<Category> {
        let draft = form.validate()?;
        let admin = require_admin(&self.session)?;
        let category = self.categories.create(&draft.into_insert(admin.id)).await?;
        tracing::info!(category_id = %category.id, name = %category.name, "Created category");
        Ok(category)
    }

    pub async fn update(&self, id: Uuid, form: &CategoryForm) -> AppResult<Category> {
        let draft = form.validate()?;
        require_admin(&self.session)?;
        self.categories.update(id, draft.into_update()).await
    }

    /// Prompts referencing the category are left to the backend's
    /// foreign-key rules.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        require_admin(&self.session)?;
        self.categories.delete(id).await?;
        tracing::info!(category_id = %id, "Deleted category");
        Ok(())
    }
}
