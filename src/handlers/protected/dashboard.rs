// handlers/protected/dashboard.rs - GET /dashboard

use axum::extract::{Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::SharedContext;
use crate::database::PromptFilters;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::DashboardView;
use crate::validation::parse_tags;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub is_public: Option<bool>,
    pub created_by: Option<Uuid>,
    /// Only the signed-in user's prompts
    pub mine: Option<bool>,
    /// Comma-separated; a prompt matches when it has any of them
    pub tags: Option<String>,
}

/// GET /dashboard - Prompts with the query's filters applied, categories and
/// the tags available for filtering.
pub async fn dashboard_get(
    State(context): State<SharedContext>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<DashboardView> {
    let mut filters = PromptFilters {
        category_id: query.category_id,
        search: query.search,
        is_public: query.is_public,
        created_by: query.created_by,
    };
    if query.mine.unwrap_or(false) {
        filters.created_by = Some(context.session.current_profile()?.id);
    }
    let tags = query.tags.as_deref().map(parse_tags).unwrap_or_default();

    let view = context.prompts.dashboard(&filters, &tags).await?;
    Ok(ApiResponse::success(view))
}
