//! Delivery of batch reports to caller-supplied callback URLs.
//!
//! A bulk request that names a `callback_url` is answered with `202` and a
//! correlation id. The batch then runs in a spawned task and its outcome is
//! POSTed to the callback as [`CallbackPayload`]. Transient delivery failures
//! (network errors, 429, 5xx) are retried with exponential back-off and
//! jitter; anything else is logged and dropped. Spawned batches are tracked
//! so shutdown can wait for their callbacks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use adbatch_pipeline::{BatchOrchestrator, BatchReport, BatchRequest, StagedBatch};
use serde::Serialize;
use thiserror::Error;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("callback endpoint answered HTTP {status}")]
    Rejected { status: u16 },
}

/// Body POSTed to the callback URL.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackPayload {
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl CallbackNotifier {
    /// # Errors
    ///
    /// Returns [`CallbackError::Http`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_retries,
            backoff_base_ms: 1_000,
        })
    }

    #[must_use]
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// POSTs `payload` to `url`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last [`CallbackError`] once retries are exhausted or the
    /// failure is not transient.
    pub async fn deliver(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self.client.post(url).json(payload).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(CallbackError::Rejected {
                    status: status.as_u16(),
                })
            }
        })
        .await
    }

    /// Runs the batch and reports its outcome to `url`. Meant to be spawned.
    pub async fn run_and_notify(
        self,
        orchestrator: Arc<BatchOrchestrator>,
        batch: StagedBatch,
        request: BatchRequest,
        url: String,
        correlation_id: String,
    ) {
        let payload = match orchestrator.run(batch, &request).await {
            Ok(report) => CallbackPayload {
                correlation_id,
                report: Some(report),
                error: None,
            },
            Err(e) => {
                tracing::warn!(correlation_id = %correlation_id, error = %e, "background batch failed");
                CallbackPayload {
                    correlation_id,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };

        match self.deliver(&url, &payload).await {
            Ok(()) => tracing::info!(
                correlation_id = %payload.correlation_id,
                "batch report delivered to callback"
            ),
            Err(e) => tracing::error!(
                correlation_id = %payload.correlation_id,
                error = %e,
                "batch report could not be delivered"
            ),
        }
    }
}

/// Closes `batches` and waits up to `grace` for running batches to deliver
/// their callbacks. Returns `false` if some were still running.
pub async fn drain_batches(batches: &TaskTracker, grace: Duration) -> bool {
    batches.close();
    if batches.is_empty() {
        return true;
    }

    tracing::info!(pending = batches.len(), "waiting for background batches to finish");
    if tokio::time::timeout(grace, batches.wait()).await.is_ok() {
        true
    } else {
        tracing::warn!(
            pending = batches.len(),
            "shutdown grace period elapsed with batches still running"
        );
        false
    }
}

pub(crate) fn is_retriable(err: &CallbackError) -> bool {
    match err {
        CallbackError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        CallbackError::Rejected { status } => *status == 429 || *status >= 500,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors. Delay doubles from `backoff_base_ms` with ±25 % jitter, capped at 60 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, CallbackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallbackError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "callback delivery failed, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
