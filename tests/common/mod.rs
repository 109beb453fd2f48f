#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use futures::future::BoxFuture;
use recipebook::{
    ServerConfig, create_app,
    db::{Database, NewUser},
    mail::{MailError, MailQueueConfig, MailTransport, OutgoingMail},
    password::hash_password,
    rate_limit::RateLimitSettings,
    tokens::TokenConfig,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use url::Url;

pub const SECRET: &[u8] = b"test-secret-key-that-is-long-enough";
pub const ADMIN_EMAIL: &str = "chef@example.com";
pub const PASSWORD: &str = "correct horse battery staple";

/// Transport that keeps every message it is asked to send.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl MailTransport for RecordingTransport {
    fn send<'a>(&'a self, mail: &'a OutgoingMail) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        })
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub tokens: TokenConfig,
    pub mail: RecordingTransport,
}

pub async fn setup() -> TestApp {
    setup_with_rate_limits(RateLimitSettings {
        login_per_minute: 1000,
        register_per_minute: 1000,
    })
    .await
}

pub async fn setup_with_rate_limits(rate_limits: RateLimitSettings) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mail = RecordingTransport::default();

    let config = ServerConfig {
        db: db.clone(),
        secret_key: SECRET.to_vec(),
        public_url: Url::parse("http://localhost").expect("Invalid URL"),
        secure_cookies: false,
        confirm_ttl: 1800,
        admin_email: Some(ADMIN_EMAIL.to_string()),
        mail_transport: Arc::new(mail.clone()),
        mail_queue: MailQueueConfig {
            backoff: Duration::from_millis(10),
            ..MailQueueConfig::default()
        },
        rate_limits,
        ip_header: None,
    };

    TestApp {
        app: create_app(&config),
        db,
        tokens: TokenConfig::new(SECRET),
        mail,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn register(&self, email: &str, username: &str) -> Response<Body> {
        self.post_json(
            "/register",
            serde_json::json!({
                "email": email,
                "username": username,
                "password": PASSWORD,
                "password2": PASSWORD,
            }),
            None,
        )
        .await
    }

    /// Log in through the endpoint and return the `Cookie` header value.
    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post_json(
                "/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        session_from(&response).expect("Login should set a session cookie")
    }

    /// Insert a user directly, bypassing registration.
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        role: &str,
        confirmed: bool,
    ) -> i64 {
        let role = self
            .db
            .roles()
            .find_by_name(role)
            .await
            .unwrap()
            .expect("Role should be seeded");
        let password_hash = hash_password(PASSWORD).unwrap();

        let id = self
            .db
            .users()
            .insert(&NewUser {
                email,
                username,
                password_hash: &password_hash,
                role_id: role.id,
            })
            .await
            .unwrap();

        if confirmed {
            self.db.users().mark_confirmed(id).await.unwrap();
        }
        id
    }

    /// `Cookie` header value for a fresh session.
    pub fn cookie_for(&self, user_id: i64) -> String {
        let session = self.tokens.issue_session(user_id, false).unwrap();
        format!("session={}", session.token)
    }

    /// Wait until at least `count` messages were delivered.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<OutgoingMail> {
        for _ in 0..200 {
            let sent = self.mail.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Expected {} mail(s), got {}", count, self.mail.sent().len());
    }
}

/// The `name=value` part of the session Set-Cookie header, if any.
pub fn session_from(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Pull the token out of a confirmation mail.
pub fn token_from_mail(mail: &OutgoingMail) -> String {
    let start = mail
        .text
        .find("/confirm/")
        .expect("Mail should contain a confirmation link")
        + "/confirm/".len();
    mail.text[start..]
        .split_whitespace()
        .next()
        .unwrap()
        .to_string()
}
