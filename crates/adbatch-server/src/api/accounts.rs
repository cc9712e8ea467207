use adbatch_platform::{AdAccount, Campaign};
use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::middleware::RequestId;

use super::{map_platform_error, ApiError, ApiResponse, AppState, ResponseMeta};

pub(super) async fn list_accounts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<AdAccount>>>, ApiError> {
    let data = state
        .platform
        .list_ad_accounts()
        .await
        .map_err(|e| map_platform_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_campaigns(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(account_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Campaign>>>, ApiError> {
    let data = state
        .platform
        .list_campaigns(&account_id)
        .await
        .map_err(|e| map_platform_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
