// handlers/protected/prompts.rs - Prompt CRUD below /dashboard/prompts

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::SharedContext;
use crate::database::PromptWithDetails;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::PromptView;
use crate::validation::PromptForm;

/// POST /dashboard/prompts
pub async fn prompt_post(
    State(context): State<SharedContext>,
    Json(form): Json<PromptForm>,
) -> ApiResult<PromptWithDetails> {
    let created = context.prompts.create(&form).await?;
    Ok(ApiResponse::created(created))
}

/// GET /dashboard/prompts/:id
pub async fn prompt_get(State(context): State<SharedContext>, Path(id): Path<Uuid>) -> ApiResult<PromptView> {
    Ok(ApiResponse::success(context.prompts.get(id).await?))
}

/// PUT /dashboard/prompts/:id - Owner or admin only
pub async fn prompt_put(
    State(context): State<SharedContext>,
    Path(id): Path<Uuid>,
    Json(form): Json<PromptForm>,
) -> ApiResult<PromptWithDetails> {
    Ok(ApiResponse::success(context.prompts.update(id, &form).await?))
}

/// DELETE /dashboard/prompts/:id - Owner or admin only
pub async fn prompt_delete(State(context): State<SharedContext>, Path(id): Path<Uuid>) -> ApiResult<()> {
    context.prompts.delete(id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /dashboard/prompts/:id/use - Count one copy of the prompt
pub async fn prompt_use(
    State(context): State<SharedContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<PromptWithDetails> {
    Ok(ApiResponse::success(context.prompts.record_use(id).await?))
}
