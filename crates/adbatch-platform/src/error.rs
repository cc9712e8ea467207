use thiserror::Error;

/// Graph error code for an expired or invalidated access token.
pub const EXPIRED_TOKEN_CODE: i64 = 190;

/// Errors returned by the ads platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform rejected the request and returned its error envelope.
    #[error("platform error (HTTP {status}, code {}): {message}", .code.map_or_else(|| "n/a".to_owned(), |c| c.to_string()))]
    Api {
        status: u16,
        code: Option<i64>,
        subcode: Option<i64>,
        message: String,
    },

    /// The call exceeded its per-request time budget.
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response parsed but lacked a field the caller needs.
    #[error("unexpected response from {operation}: {reason}")]
    UnexpectedResponse { operation: String, reason: String },

    /// A local file handed to the client could not be read.
    #[error("failed to read {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid platform identifier '{0}'")]
    InvalidId(String),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("pagination limit reached for {operation}: exceeded {max_pages} pages")]
    PaginationLimit { operation: String, max_pages: usize },
}

impl PlatformError {
    /// Platform error code, when the platform supplied one.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => *code,
            _ => None,
        }
    }

    /// `true` when the access token has expired and must be replaced.
    #[must_use]
    pub fn is_expired_token(&self) -> bool {
        self.code() == Some(EXPIRED_TOKEN_CODE)
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
