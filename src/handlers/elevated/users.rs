// handlers/elevated/users.rs - User role management

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::SharedContext;
use crate::database::{Profile, UserRole};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

/// GET /admin/users
pub async fn users_get(State(context): State<SharedContext>) -> ApiResult<Vec<Profile>> {
    Ok(ApiResponse::success(context.users.list().await?))
}

/// PUT /admin/users/:id/role
pub async fn user_role_put(
    State(context): State<SharedContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<RoleRequest>,
) -> ApiResult<Profile> {
    Ok(ApiResponse::success(context.users.set_role(id, request.role).await?))
}
