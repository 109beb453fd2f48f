//! Admin API endpoints.
//!
//! All endpoints require the ADMIN permission.

use axum::{Json, Router, extract::State, middleware, response::IntoResponse, routing::get};

use super::error::{ApiError, ResultExt};
use crate::auth::{Requirement, require};
use crate::db::Database;
use crate::permissions::Permission;

#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/users", get(list_users))
        .with_state(state)
        .route_layer(middleware::from_fn_with_state(
            Requirement::permission(Permission::ADMIN),
            require,
        ))
}

/// List every account, without password verifiers.
async fn list_users(State(state): State<AdminState>) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .users()
        .list()
        .await
        .db_err("Failed to list users")?;

    Ok(Json(users))
}
