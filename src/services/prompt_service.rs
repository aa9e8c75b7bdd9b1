use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::SessionManager;
use crate::database::{
    filter_by_tags, Category, CategoryRepository, Profile, PromptFilters, PromptRepository, PromptWithDetails,
};
use crate::error::{AppError, AppResult};
use crate::filter::Filter;
use crate::validation::PromptForm;

/// Owners and administrators may edit or delete a prompt.
pub fn can_modify(profile: &Profile, prompt: &PromptWithDetails) -> bool {
    profile.is_admin() || prompt.is_owned_by(profile.id)
}

/// A prompt as shown to the current user.
#[derive(Debug, Clone, Serialize)]
pub struct PromptView {
    #[serde(flatten)]
    pub prompt: PromptWithDetails,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl PromptView {
    fn new(prompt: PromptWithDetails, viewer: Option<&Profile>) -> Self {
        let allowed = viewer.map(|p| can_modify(p, &prompt)).unwrap_or(false);
        Self {
            prompt,
            can_edit: allowed,
            can_delete: allowed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub prompts: Vec<PromptView>,
    pub categories: Vec<Category>,
    /// Every tag on the unfiltered-by-tag result, sorted.
    pub available_tags: Vec<String>,
    pub selected_tags: Vec<String>,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct PromptService {
    prompts: PromptRepository,
    categories: CategoryRepository,
    session: Arc<SessionManager>,
}

impl PromptService {
    pub fn new(prompts: PromptRepository, categories: CategoryRepository, session: Arc<SessionManager>) -> Self {
        Self {
            prompts,
            categories,
            session,
        }
    }

    fn viewer(&self) -> AppResult<Option<Profile>> {
        let state = self.session.state();
        if !state.is_authenticated() {
            return Err(AppError::auth("Sign in required"));
        }
        Ok(state.profile().cloned())
    }

    /// Backend-filtered prompts, then narrowed to `tags` (any match).
    pub async fn dashboard(&self, filters: &PromptFilters, tags: &[String]) -> AppResult<DashboardView> {
        let viewer = self.viewer()?;
        let (prompts, categories) = futures::try_join!(
            self.prompts.list(filters.to_filter()),
            self.categories.list(Filter::new())
        )?;

        let available_tags: BTreeSet<String> = prompts
            .iter()
            .flat_map(|p| p.prompt.tags.iter().cloned())
            .collect();
        let prompts = filter_by_tags(prompts, tags)
            .into_iter()
            .map(|p| PromptView::new(p, viewer.as_ref()))
            .collect();

        Ok(DashboardView {
            prompts,
            categories,
            available_tags: available_tags.into_iter().collect(),
            selected_tags: tags.to_vec(),
            is_admin: viewer.map(|p| p.is_admin()).unwrap_or(false),
        })
    }

    pub async fn get(&self, id: Uuid) -> AppResult<PromptView> {
        let viewer = self.viewer()?;
        let prompt = self.prompts.get_by_id(id).await?;
        Ok(PromptView::new(prompt, viewer.as_ref()))
    }

    pub async fn create(&self, form: &PromptForm) -> AppResult<PromptWithDetails> {
        let draft = form.validate()?;
        let profile = self.session.current_profile()?;
        let created = self.prompts.create(&draft.into_insert(profile.id)).await?;
        tracing::info!(prompt_id = %created.prompt.id, user_id = %profile.id, "Created prompt");
        Ok(created)
    }

    async fn load_modifiable(&self, id: Uuid, action: &str) -> AppResult<(Profile, PromptWithDetails)> {
        let profile = self.session.current_profile()?;
        let prompt = self.prompts.get_by_id(id).await?;
        if !can_modify(&profile, &prompt) {
            tracing::warn!(prompt_id = %id, user_id = %profile.id, action, "Prompt change refused");
            return Err(AppError::forbidden(format!("You cannot {} this prompt", action)));
        }
        Ok((profile, prompt))
    }

    pub async fn update(&self, id: Uuid, form: &PromptForm) -> AppResult<PromptWithDetails> {
        let draft = form.validate()?;
        self.load_modifiable(id, "edit").await?;
        self.prompts.update(id, draft.into_update()).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let (profile, _) = self.load_modifiable(id, "delete").await?;
        self.prompts.delete(id).await?;
        tracing::info!(prompt_id = %id, user_id = %profile.id, "Deleted prompt");
        Ok(())
    }

    /// Count one use of the prompt (the copy action) and return it.
    pub async fn record_use(&self, id: Uuid) -> AppResult<PromptWithDetails> {
        self.viewer()?;
        self.prompts.get_by_id(id).await?;
        self.prompts.increment_usage(id).await?;
        self.prompts.get_by_id(id).await
    }
}
