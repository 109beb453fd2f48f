mod common;

use axum::http::StatusCode;
use common::{TestApp, body_json, body_text, setup};

struct Users {
    user: i64,
    moderator: i64,
    admin: i64,
}

async fn seed(t: &TestApp) -> Users {
    Users {
        user: t.create_user("user@example.com", "user", "User", true).await,
        moderator: t
            .create_user("mod@example.com", "moderator", "Moderator", true)
            .await,
        admin: t
            .create_user("admin@example.com", "admin", "Administrator", true)
            .await,
    }
}

#[tokio::test]
async fn test_admin_users_requires_admin() {
    let t = setup().await;
    let users = seed(&t).await;

    assert_eq!(
        t.get("/admin/users", None).await.status(),
        StatusCode::FORBIDDEN
    );
    for id in [users.user, users.moderator] {
        let response = t.get("/admin/users", Some(&t.cookie_for(id))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Forbidden");
    }
}

#[tokio::test]
async fn test_admin_lists_users_without_password_hashes() {
    let t = setup().await;
    let users = seed(&t).await;

    let response = t
        .get("/admin/users", Some(&t.cookie_for(users.admin)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let list = json.as_array().unwrap();
    assert_eq!(list.len(), 3);
    for entry in list {
        assert!(entry.get("password_hash").is_none());
        assert!(entry["role"].is_string());
    }
    assert!(list.iter().any(|u| u["username"] == "moderator" && u["role"] == "Moderator"));
}

#[tokio::test]
async fn test_moderate_requires_moderate() {
    let t = setup().await;
    let users = seed(&t).await;
    let uri = format!("/moderate/users/{}", users.user);

    assert_eq!(t.get(&uri, None).await.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        t.get(&uri, Some(&t.cookie_for(users.user))).await.status(),
        StatusCode::FORBIDDEN
    );

    for id in [users.moderator, users.admin] {
        let response = t.get(&uri, Some(&t.cookie_for(id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["username"], "user");
        assert!(json.get("password_hash").is_none());
    }
}

#[tokio::test]
async fn test_moderate_unknown_user() {
    let t = setup().await;
    let users = seed(&t).await;

    let response = t
        .get("/moderate/users/9999", Some(&t.cookie_for(users.moderator)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_reports_role_permissions() {
    let t = setup().await;
    let users = seed(&t).await;

    let cases = [
        (users.user, "User", vec!["review", "publish", "upload"]),
        (
            users.moderator,
            "Moderator",
            vec!["review", "publish", "upload", "moderate"],
        ),
        (
            users.admin,
            "Administrator",
            vec!["review", "publish", "upload", "moderate", "admin"],
        ),
    ];

    for (id, role, permissions) in cases {
        let response = t.get("/me", Some(&t.cookie_for(id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], id);
        assert_eq!(json["role"], role);
        assert_eq!(json["confirmed"], true);
        assert_eq!(json["permissions"], serde_json::json!(permissions));
        assert!(json["last_seen"].is_string());
    }
}

#[tokio::test]
async fn test_login_required_routes_forbid_anonymous() {
    let t = setup().await;

    for path in ["/me", "/secret", "/logout"] {
        let response = t.get(path, None).await;
        assert_eq!(
            response.status(),
            StatusCode::FORBIDDEN,
            "{} should be forbidden",
            path
        );
    }
}

#[tokio::test]
async fn test_secret_for_any_confirmed_user() {
    let t = setup().await;
    let users = seed(&t).await;

    let response = t.get("/secret", Some(&t.cookie_for(users.user))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Only for auth");
}

#[tokio::test]
async fn test_index_anonymous_and_signed_in() {
    let t = setup().await;
    let users = seed(&t).await;

    let json = body_json(t.get("/", None).await).await;
    assert_eq!(json["authenticated"], false);
    assert!(json.get("username").is_none());

    let json = body_json(t.get("/", Some(&t.cookie_for(users.user))).await).await;
    assert_eq!(json["authenticated"], true);
    assert_eq!(json["username"], "user");
}

#[tokio::test]
async fn test_session_for_deleted_user_is_anonymous() {
    let t = setup().await;

    let response = t.get("/me", Some(&t.cookie_for(4242))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
