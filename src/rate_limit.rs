//! Rate limiting for the account endpoints.
//!
//! Token buckets keyed by client IP, so one address cannot hammer the login
//! form or flood the database with registrations.

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{
    num::NonZeroU32,
    sync::{Arc, Weak},
    time::Duration,
};
use tracing::{debug, warn};

use crate::auth::extract_client_ip;

/// How often idle keys are dropped from the limiters.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Requests per minute allowed from one address.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub login_per_minute: u32,
    pub register_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_minute: 10,
            register_per_minute: 3,
        }
    }
}

#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    pub register: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Zero is treated as one request per minute.
    pub fn new(settings: RateLimitSettings) -> Self {
        let per_minute = |n: u32| Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN));
        Self {
            login: Arc::new(RateLimiter::keyed(per_minute(settings.login_per_minute))),
            register: Arc::new(RateLimiter::keyed(per_minute(settings.register_per_minute))),
        }
    }

    /// Forget addresses whose quota has fully replenished.
    pub fn prune(&self) {
        prune_limiter(&self.login);
        prune_limiter(&self.register);
    }

    /// Prune both limiters periodically in a background task. The task ends
    /// once the limiters are dropped.
    pub fn spawn_pruner(&self) -> tokio::task::JoinHandle<()> {
        let login = Arc::downgrade(&self.login);
        let register = Arc::downgrade(&self.register);
        tokio::spawn(run_pruner(login, register, PRUNE_INTERVAL))
    }
}

fn prune_limiter(limiter: &IpLimiter) {
    limiter.retain_recent();
    limiter.shrink_to_fit();
}

async fn run_pruner(login: Weak<IpLimiter>, register: Weak<IpLimiter>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let (Some(login), Some(register)) = (login.upgrade(), register.upgrade()) else {
            debug!("Rate limiters dropped, stopping pruner");
            return;
        };
        prune_limiter(&login);
        prune_limiter(&register);
        debug!(
            login_keys = login.len(),
            register_keys = register.len(),
            "Pruned rate limiters"
        );
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub config: RateLimitConfig,
    pub ip_header: Option<HeaderName>,
}

fn client_key(state: &RateLimitState, request: &Request) -> String {
    extract_client_ip(request, state.ip_header.as_ref()).unwrap_or_else(|| "unknown".to_string())
}

fn too_many(message: &'static str) -> Response {
    (StatusCode::TOO_MANY_REQUESTS, message).into_response()
}

/// Middleware for the login endpoint.
pub async fn rate_limit_login(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&state, &request);
    match state.config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Login rate limit exceeded");
            too_many("Too many login attempts. Please wait before trying again.")
        }
    }
}

/// Middleware for the registration endpoint.
pub async fn rate_limit_register(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&state, &request);
    match state.config.register.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Registration rate limit exceeded");
            too_many("Too many signup attempts. Please wait before trying again.")
        }
    }
}
