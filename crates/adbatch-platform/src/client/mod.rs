//! HTTP client for the Graph-style ads REST API.
//!
//! Wraps `reqwest` with platform-specific error handling, bearer-token
//! management, and typed response deserialization. Non-2xx responses are
//! decoded from the platform's `{"error": {...}}` envelope into
//! [`PlatformError::Api`]; client-side timeouts surface as
//! [`PlatformError::Timeout`].

mod accounts;
mod ads;
mod media;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

use crate::error::PlatformError;
use crate::platform::AdsPlatform;
use crate::types::{
    AdAccount, Campaign, ErrorEnvelope, NewAd, NewCreative, RawCreative, VideoSource,
};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_API_VERSION: &str = "v19.0";

/// Upper bound on pages followed by the list endpoints.
pub(crate) const MAX_PAGES: usize = 50;

/// Connection and timeout settings for [`GraphClient`].
#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    pub access_token: String,
    pub base_url: String,
    pub api_version: String,
    pub user_agent: String,
    /// Budget for every call except video uploads.
    pub request_timeout: Duration,
    /// Budget for a single video upload.
    pub upload_timeout: Duration,
}

impl GraphClientConfig {
    /// Production defaults for the given token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            user_agent: "adbatch/0.1 (bulk-ads)".to_owned(),
            request_timeout: Duration::from_secs(30),
            upload_timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &adbatch_core::AppConfig) -> Self {
        Self {
            access_token: config.access_token.clone(),
            base_url: config.graph_base_url.clone(),
            api_version: config.graph_api_version.clone(),
            user_agent: config.user_agent.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            upload_timeout: Duration::from_secs(config.video_upload_timeout_secs),
        }
    }
}

/// Client for the ads platform.
///
/// Use [`GraphClient::new`] with a config whose `base_url` points at a mock
/// server in tests.
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: Url,
    upload_timeout: Duration,
}

impl GraphClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`PlatformError::InvalidBaseUrl`] if the
    /// base URL and version do not form a valid URL.
    pub fn new(config: &GraphClientConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.as_str())
            .build()?;

        // Exactly one slash between base, version and the relative paths
        // joined later, otherwise `Url::join` replaces the last segment.
        let version = config.api_version.trim_matches('/');
        let normalised = if version.is_empty() {
            format!("{}/", config.base_url.trim_end_matches('/'))
        } else {
            format!("{}/{version}/", config.base_url.trim_end_matches('/'))
        };
        let base_url = Url::parse(&normalised).map_err(|e| PlatformError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            base_url,
            upload_timeout: config.upload_timeout,
        })
    }

    /// Resolves `path` (already validated segments) against the versioned base.
    fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
        self.base_url
            .join(path)
            .map_err(|e| PlatformError::InvalidBaseUrl {
                url: format!("{}{path}", self.base_url),
                reason: e.to_string(),
            })
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url).bearer_auth(&self.access_token)
    }

    fn post(&self, url: Url) -> RequestBuilder {
        self.client.post(url).bearer_auth(&self.access_token)
    }

    /// Sends `request`, maps non-2xx statuses to [`PlatformError::Api`], and
    /// parses a 2xx body as `T`.
    async fn send_json<T: DeserializeOwned>(
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(e, operation))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, operation))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| PlatformError::Deserialize {
            context: operation.to_owned(),
            source: e,
        })
    }
}

fn map_transport_error(err: reqwest::Error, operation: &str) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout {
            operation: operation.to_owned(),
        }
    } else {
        PlatformError::Http(err)
    }
}

/// Decodes the platform error envelope, falling back to the raw body.
fn api_error(status: u16, body: &str) -> PlatformError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let detail = envelope.error;
            let message = match detail.error_user_msg {
                Some(user_msg) if !user_msg.is_empty() => {
                    format!("{} ({user_msg})", detail.message)
                }
                _ => detail.message,
            };
            PlatformError::Api {
                status,
                code: detail.code,
                subcode: detail.error_subcode,
                message,
            }
        }
        Err(_) => {
            let mut message: String = body.chars().take(300).collect();
            if message.trim().is_empty() {
                message = format!("HTTP {status} with empty body");
            }
            PlatformError::Api {
                status,
                code: None,
                subcode: None,
                message,
            }
        }
    }
}

/// Rejects ids that could escape their path segment.
pub(crate) fn validate_id(id: &str) -> Result<&str, PlatformError> {
    let trimmed = id.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(PlatformError::InvalidId(id.to_owned()));
    }
    Ok(trimmed)
}

/// Account path segment, always carrying the `act_` prefix.
pub(crate) fn account_segment(account_id: &str) -> Result<String, PlatformError> {
    let id = validate_id(account_id)?;
    if id.starts_with("act_") {
        Ok(id.to_owned())
    } else {
        Ok(format!("act_{id}"))
    }
}

#[async_trait]
impl AdsPlatform for GraphClient {
    async fn upload_video(
        &self,
        account_id: &str,
        source: &VideoSource,
        filename: &str,
    ) -> Result<String, PlatformError> {
        GraphClient::upload_video(self, account_id, source, filename).await
    }

    async fn upload_image(
        &self,
        account_id: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, PlatformError> {
        GraphClient::upload_image(self, account_id, bytes, filename).await
    }

    async fn recent_ad_creative(&self, target: &str) -> Result<Option<RawCreative>, PlatformError> {
        GraphClient::recent_ad_creative(self, target).await
    }

    async fn create_creative(
        &self,
        account_id: &str,
        creative: &NewCreative,
    ) -> Result<String, PlatformError> {
        GraphClient::create_creative(self, account_id, creative).await
    }

    async fn create_ad(&self, account_id: &str, ad: &NewAd) -> Result<String, PlatformError> {
        GraphClient::create_ad(self, account_id, ad).await
    }

    async fn list_ad_accounts(&self) -> Result<Vec<AdAccount>, PlatformError> {
        GraphClient::list_ad_accounts(self).await
    }

    async fn list_campaigns(&self, account_id: &str) -> Result<Vec<Campaign>, PlatformError> {
        GraphClient::list_campaigns(self, account_id).await
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
