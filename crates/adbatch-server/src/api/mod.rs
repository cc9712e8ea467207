mod accounts;
mod bulk;

use std::sync::Arc;

use adbatch_pipeline::{AssetStager, BatchOrchestrator};
use adbatch_platform::{AdsPlatform, PlatformError};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::callback::CallbackNotifier;
use crate::middleware::{
    enforce_quota, request_id, require_bearer_auth, AuthState, RateLimits, RequestId,
};

/// Multipart framing allowance on top of the file bytes of a bulk request.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<dyn AdsPlatform>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub stager: AssetStager,
    pub callbacks: CallbackNotifier,
    /// Callback-mode batches still running; drained on shutdown.
    pub batches: TaskTracker,
    /// Bucket handed to every batch when blob hosting is enabled.
    pub blob_bucket: Option<String>,
    /// Per-file cap. The bulk route body limit scales it by the number of
    /// files a request may carry.
    pub max_upload_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    staging: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "payload_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_platform_error(request_id: String, error: &PlatformError) -> ApiError {
    match error {
        PlatformError::InvalidId(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        _ if error.is_expired_token() => {
            tracing::error!(error = %error, "platform access token expired");
            ApiError::new(
                request_id,
                "bad_gateway",
                "the platform access token has expired; generate a new one and restart the service",
            )
        }
        _ => {
            tracing::error!(error = %error, "platform request failed");
            ApiError::new(request_id, "bad_gateway", error.to_string())
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

/// Whole-request cap for the bulk route: every allowed file at the per-file
/// cap, plus framing.
fn bulk_body_limit(max_upload_bytes: u64) -> usize {
    let files = u64::try_from(bulk::MAX_VIDEOS_PER_REQUEST + 1).unwrap_or(u64::MAX);
    let bytes = max_upload_bytes
        .saturating_mul(files)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    usize::try_from(bytes).unwrap_or(usize::MAX)
}

fn protected_router(auth: AuthState, limits: RateLimits, max_upload_bytes: u64) -> Router<AppState> {
    let listing = Router::new()
        .route("/api/v1/accounts", get(accounts::list_accounts))
        .route(
            "/api/v1/accounts/{account_id}/campaigns",
            get(accounts::list_campaigns),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            limits.listing,
            enforce_quota,
        ));

    let bulk = Router::new()
        .route(
            "/api/v1/ads/bulk",
            post(bulk::create_bulk_ads)
                .layer(DefaultBodyLimit::max(bulk_body_limit(max_upload_bytes))),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            limits.bulk,
            enforce_quota,
        ));

    listing
        .merge(bulk)
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState, limits: RateLimits) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, limits, max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match tokio::fs::metadata(state.stager.dir()).await {
        Ok(m) if m.is_dir() => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    staging: "ok",
                },
                meta,
            }),
        ),
        result => {
            tracing::warn!(
                dir = %state.stager.dir().display(),
                error = ?result.err(),
                "health check: staging directory unavailable"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        staging: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}
