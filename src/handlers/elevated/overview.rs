use axum::extract::State;
use serde_json::{json, Value};

use crate::app::SharedContext;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /admin - Both admin tabs in one document
pub async fn admin_get(State(context): State<SharedContext>) -> ApiResult<Value> {
    let (users, categories) = futures::try_join!(context.users.list(), context.categories.list())?;
    Ok(ApiResponse::success(json!({
        "tabs": ["users", "categories"],
        "users": users,
        "categories": categories,
    })))
}
