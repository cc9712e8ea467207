//! `POST /api/v1/ads/bulk`: multipart upload that runs one batch.
//!
//! Files are streamed straight into the stager while the form is read.
//! Without a `callback_url` the batch runs inline and the report is the
//! response body. With one, the request is answered `202 Accepted` with a
//! correlation id and the report is delivered to the callback later.

use std::sync::Arc;

use adbatch_pipeline::{
    stager::mime_for, BatchReport, BatchRequest, PipelineError, StagedAsset, StagedBatch,
};
use adbatch_platform::AdStatus;
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{ApiError, AppState, ResponseMeta};

/// Videos accepted in one bulk request; the route body limit is sized from it.
pub(super) const MAX_VIDEOS_PER_REQUEST: usize = 10;

#[derive(Debug, Serialize)]
struct BulkResponse {
    #[serde(flatten)]
    report: BatchReport,
    meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
struct AcceptedResponse {
    correlation_id: String,
    meta: ResponseMeta,
}

struct BulkForm {
    batch: StagedBatch,
    request: BatchRequest,
    callback_url: Option<String>,
}

pub(super) async fn create_bulk_ads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let BulkForm {
        batch,
        request,
        callback_url,
    } = read_form(&state, &req_id.0, multipart).await?;

    state
        .orchestrator
        .validate(&batch, &request)
        .map_err(|e| pipeline_error(&req_id.0, e))?;

    if let Some(url) = callback_url {
        let correlation_id = Uuid::new_v4().to_string();
        tracing::info!(
            correlation_id = %correlation_id,
            callback = %url,
            assets = batch.videos().len(),
            "bulk batch accepted for background processing"
        );
        state.batches.spawn(state.callbacks.clone().run_and_notify(
            Arc::clone(&state.orchestrator),
            batch,
            request,
            url,
            correlation_id.clone(),
        ));
        return Ok((
            StatusCode::ACCEPTED,
            Json(AcceptedResponse {
                correlation_id,
                meta: ResponseMeta::new(req_id.0),
            }),
        )
            .into_response());
    }

    let report = state
        .orchestrator
        .run(batch, &request)
        .await
        .map_err(|e| pipeline_error(&req_id.0, e))?;

    Ok(Json(BulkResponse {
        report,
        meta: ResponseMeta::new(req_id.0),
    })
    .into_response())
}

async fn read_form(
    state: &AppState,
    req_id: &str,
    mut multipart: Multipart,
) -> Result<BulkForm, ApiError> {
    let mut batch = StagedBatch::new();
    let mut targets = Vec::new();
    let mut account_id = String::new();
    let mut name_prefix = String::new();
    let mut ad_name = None;
    let mut status = AdStatus::default();
    let mut callback_url = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(req_id, &e))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "files" | "creative-file" => {
                if batch.videos().len() >= MAX_VIDEOS_PER_REQUEST {
                    return Err(ApiError::new(
                        req_id,
                        "validation_error",
                        format!("at most {MAX_VIDEOS_PER_REQUEST} video files are accepted per request"),
                    ));
                }
                if let Some(asset) = stage_field(state, req_id, field).await? {
                    batch.push_video(asset);
                }
            }
            "thumbnail" => {
                if let Some(asset) = stage_field(state, req_id, field).await? {
                    batch.set_thumbnail(asset);
                }
            }
            "targets" => {
                let raw = text(req_id, field).await?;
                targets.extend(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_owned),
                );
            }
            "account_id" => account_id = text(req_id, field).await?,
            "name_prefix" => name_prefix = text(req_id, field).await?,
            "ad_name" => ad_name = non_blank(&text(req_id, field).await?),
            "status" => {
                if let Some(raw) = non_blank(&text(req_id, field).await?) {
                    status = AdStatus::parse(&raw).ok_or_else(|| {
                        ApiError::new(
                            req_id,
                            "validation_error",
                            format!("status must be 'paused' or 'active', got '{raw}'"),
                        )
                    })?;
                }
            }
            "callback_url" => {
                callback_url = non_blank(&text(req_id, field).await?)
                    .map(|url| parse_callback_url(req_id, &url))
                    .transpose()?;
            }
            other => tracing::debug!(field = %other, "ignoring unknown multipart field"),
        }
    }

    if batch.is_empty() {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "no video files were provided; send them in the 'files' field",
        ));
    }

    Ok(BulkForm {
        batch,
        request: BatchRequest {
            account_id,
            targets,
            name_prefix,
            ad_name,
            status,
            blob_bucket: state.blob_bucket.clone(),
        },
        callback_url,
    })
}

/// Stages one file part. Parts without a filename or without bytes are
/// skipped: browsers send an empty part when no file was picked.
async fn stage_field(
    state: &AppState,
    req_id: &str,
    field: Field<'_>,
) -> Result<Option<StagedAsset>, ApiError> {
    let Some(file_name) = field
        .file_name()
        .map(str::to_owned)
        .filter(|n| !n.trim().is_empty())
    else {
        return Ok(None);
    };
    let mime = field
        .content_type()
        .map_or_else(|| mime_for(&file_name).to_owned(), str::to_owned);

    let asset = state
        .stager
        .stage_stream(&file_name, &mime, field)
        .await
        .map_err(|e| pipeline_error(req_id, e))?;

    if asset.size() == 0 {
        tracing::debug!(asset = %file_name, "skipping empty file part");
        return Ok(None);
    }
    Ok(Some(asset))
}

async fn text(req_id: &str, field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(|e| multipart_error(req_id, &e))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn parse_callback_url(req_id: &str, raw: &str) -> Result<String, ApiError> {
    match reqwest::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url.to_string()),
        _ => Err(ApiError::new(
            req_id,
            "validation_error",
            format!("callback_url '{raw}' is not an http(s) URL"),
        )),
    }
}

fn multipart_error(req_id: &str, error: &MultipartError) -> ApiError {
    let code = if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "bad_request"
    };
    ApiError::new(req_id, code, error.body_text())
}

fn pipeline_error(req_id: &str, error: PipelineError) -> ApiError {
    match error {
        PipelineError::Validation(message) => ApiError::new(req_id, "validation_error", message),
        PipelineError::Io { ref source, .. } => {
            // Body read failures surface from the stager wrapped in an io::Error.
            if let Some(multipart) = source
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<MultipartError>())
            {
                return multipart_error(req_id, multipart);
            }
            tracing::error!(error = %error, "failed to stage upload");
            ApiError::new(req_id, "internal_error", "failed to stage upload")
        }
        other => {
            tracing::error!(error = %other, "bulk batch failed");
            ApiError::new(req_id, "internal_error", "bulk batch failed")
        }
    }
}
