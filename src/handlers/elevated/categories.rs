// handlers/elevated/categories.rs - Category management

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::SharedContext;
use crate::database::Category;
use crate::middleware::{ApiResponse, ApiResult};
use crate::validation::CategoryForm;

/// GET /admin/categories
pub async fn categories_get(State(context): State<SharedContext>) -> ApiResult<Vec<Category>> {
    Ok(ApiResponse::success(context.categories.list().await?))
}

/// POST /admin/categories
pub async fn category_post(
    State(context): State<SharedContext>,
    Json(form): Json<CategoryForm>,
) -> ApiResult<Category> {
    Ok(ApiResponse::created(context.categories.create(&form).await?))
}

/// PUT /admin/categories/:id
pub async fn category_put(
    State(context): State<SharedContext>,
    Path(id): Path<Uuid>,
    Json(form): Json<CategoryForm>,
) -> ApiResult<Category> {
    Ok(ApiResponse::success(context.categories.update(id, &form).await?))
}

/// DELETE /admin/categories/:id
pub async fn category_delete(State(context): State<SharedContext>, Path(id): Path<Uuid>) -> ApiResult<()> {
    context.categories.delete(id).await?;
    Ok(ApiResponse::no_content())
}
