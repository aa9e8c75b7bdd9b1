pub mod category_service;
pub mod prompt_service;
pub mod user_service;

pub use category_service::CategoryService;
pub use prompt_service::{can_modify, DashboardView, PromptService, PromptView};
pub use user_service::UserService;

use crate::auth::SessionManager;
use crate::database::Profile;
use crate::error::{AppError, AppResult};

/// Resolved profile of an administrator, or `Forbidden`.
pub(crate) fn require_admin(session: &SessionManager) -> AppResult<Profile> {
    let profile = session.current_profile()?;
    if !profile.is_admin() {
        return Err(AppError::forbidden("Administrator access required"));
    }
    Ok(profile)
}
