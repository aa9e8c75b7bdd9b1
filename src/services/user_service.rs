use std::sync::Arc;
use uuid::Uuid;

use super::require_admin;
use crate::auth::SessionManager;
use crate::database::{Profile, ProfileRepository, ProfileUpdate, UserRole};
use crate::error::AppResult;
use crate::filter::Filter;

#[derive(Clone)]
pub struct UserService {
    profiles: ProfileRepository,
    session: Arc<SessionManager>,
}

impl UserService {
    pub fn new(profiles: ProfileRepository, session: Arc<SessionManager>) -> Self {
        Self { profiles, session }
    }

    /// All profiles, newest first.
    pub async fn list(&self) -> AppResult<Vec<Profile>> {
        require_admin(&self.session)?;
        self.profiles.list(Filter::new()).await
    }

    pub async fn set_role(&self, id: Uuid, role: UserRole) -> AppResult<Profile> {
        let admin = require_admin(&self.session)?;
        let updated = self.profiles.update(id, ProfileUpdate::role(role)).await?;
        tracing::info!(user_id = %id, role = %role, by = %admin.id, "Changed user role");

        if id == admin.id {
            self.session.reload_profile().await;
        }
        Ok(updated)
    }
}
