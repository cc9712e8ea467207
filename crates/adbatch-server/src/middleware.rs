//! Request identity for the HTTP surface: request ids, bearer-key callers,
//! and per-caller request quotas.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const API_KEYS_VAR: &str = "ADBATCH_API_KEYS";
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Who is calling. Quotas are tracked per caller; the raw key never leaves
/// [`AuthState`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller(pub String);

impl Caller {
    fn anonymous() -> Self {
        Self("anonymous".to_owned())
    }
}

/// Bearer keys accepted by the protected routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Reads comma-separated keys from `ADBATCH_API_KEYS`.
    ///
    /// # Errors
    ///
    /// Fails outside development when no key is configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// # Errors
    ///
    /// Fails outside development when `raw` holds no key.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        keys.sort();
        keys.dedup();

        match (keys.is_empty(), is_development) {
            (false, _) => Ok(Self {
                api_keys: Arc::new(keys),
                enabled: true,
            }),
            (true, true) => {
                tracing::warn!("{API_KEYS_VAR} is empty; bulk uploads accept anonymous callers");
                Ok(Self::disabled())
            }
            (true, false) => {
                anyhow::bail!("{API_KEYS_VAR} must list at least one bearer key outside development")
            }
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::new(Vec::new()),
            enabled: false,
        }
    }

    /// Caller for `token`, comparing against every key in constant time.
    fn caller_for(&self, token: &str) -> Option<Caller> {
        self.api_keys
            .iter()
            .enumerate()
            .fold(None, |found, (idx, key)| {
                let hit = bool::from(key.as_bytes().ct_eq(token.as_bytes()));
                found.or(hit.then_some(idx))
            })
            .map(|idx| Caller(format!("key-{idx}")))
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request quota kept separately for each [`Caller`].
#[derive(Debug, Clone)]
pub struct CallerQuota {
    max_requests: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<Caller, Window>>>,
}

impl CallerQuota {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request for `caller`, or returns how long until its window
    /// resets.
    async fn acquire(&self, caller: &Caller) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(caller.clone()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        let elapsed = now.duration_since(window.started_at);
        if elapsed >= self.window {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }
        if window.count >= self.max_requests {
            return Err(self.window.saturating_sub(elapsed));
        }
        window.count += 1;
        Ok(())
    }
}

/// Quotas for the listing routes and for bulk submissions.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub listing: CallerQuota,
    pub bulk: CallerQuota,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            listing: CallerQuota::new(120, Duration::from_secs(60)),
            bulk: CallerQuota::new(10, Duration::from_secs(60)),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Uses the caller's `x-request-id` or mints a v4 UUID, and echoes it back.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    res
}

/// Resolves the [`Caller`] from the bearer key. With auth disabled every
/// request is the anonymous caller.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let caller = if auth.enabled {
        let token = extract_bearer_token(req.headers().get(header::AUTHORIZATION));
        match token.and_then(|t| auth.caller_for(t)) {
            Some(caller) => caller,
            None => {
                return ApiError::new(
                    request_id_of(&req),
                    "unauthorized",
                    "missing or invalid bearer token",
                )
                .into_response();
            }
        }
    } else {
        Caller::anonymous()
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

/// Charges the request to its caller's quota. Must run inside
/// [`require_bearer_auth`].
pub async fn enforce_quota(State(quota): State<CallerQuota>, req: Request, next: Next) -> Response {
    let caller = req
        .extensions()
        .get::<Caller>()
        .cloned()
        .unwrap_or_else(Caller::anonymous);

    match quota.acquire(&caller).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::warn!(caller = %caller.0, path = %req.uri().path(), "request quota exhausted");
            let mut res = ApiError::new(
                request_id_of(&req),
                "rate_limited",
                format!(
                    "request quota exhausted; retry in {}s",
                    retry_after.as_secs().max(1)
                ),
            )
            .into_response();
            res.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after.as_secs().max(1)),
            );
            res
        }
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
