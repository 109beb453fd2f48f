//! Moderator endpoints. Require the MODERATE permission.

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::get,
};

use super::error::{ApiError, ResultExt};
use crate::auth::{Requirement, require};
use crate::db::{Database, UserSummary};
use crate::permissions::Permission;

#[derive(Clone)]
pub struct ModerationState {
    pub db: Database,
}

pub fn router(state: ModerationState) -> Router {
    Router::new()
        .route("/users/{id}", get(user_profile))
        .with_state(state)
        .route_layer(middleware::from_fn_with_state(
            Requirement::permission(Permission::MODERATE),
            require,
        ))
}

async fn user_profile(
    State(state): State<ModerationState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .find_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserSummary::from(&user)))
}
