//! Site-wide pages: the index, a login-only page and the caller's profile.

use axum::{Json, Router, middleware, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::auth::{CurrentUser, MaybeUser, Requirement, require};

pub fn router() -> Router {
    let signed_in = Router::new()
        .route("/secret", get(secret))
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            Requirement::login(),
            require,
        ));

    Router::new().route("/", get(index)).merge(signed_in)
}

#[derive(Serialize)]
struct IndexResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

async fn index(MaybeUser(user): MaybeUser) -> impl IntoResponse {
    Json(IndexResponse {
        authenticated: user.is_some(),
        username: user.map(|u| u.username),
    })
}

async fn secret() -> &'static str {
    "Only for auth"
}

#[derive(Serialize)]
struct ProfileResponse {
    id: i64,
    username: String,
    email: String,
    confirmed: bool,
    role: String,
    permissions: Vec<&'static str>,
    member_since: String,
    last_seen: String,
}

async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(ProfileResponse {
        id: user.id,
        permissions: user.role.permissions.names(),
        role: user.role.name,
        username: user.username,
        email: user.email,
        confirmed: user.confirmed,
        member_since: user.member_since,
        last_seen: user.last_seen,
    })
}
