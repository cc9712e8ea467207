use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub access_token: String,
    pub graph_base_url: String,
    pub graph_api_version: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub video_upload_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    pub max_concurrent_targets: usize,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// When set, staged videos are hosted in this bucket and handed to the
    /// platform by URL instead of being uploaded as bytes.
    pub blob_bucket: Option<String>,
    pub callback_max_retries: u32,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("access_token", &"[redacted]")
            .field("graph_base_url", &self.graph_base_url)
            .field("graph_api_version", &self.graph_api_version)
            .field("user_agent", &self.user_agent)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("video_upload_timeout_secs", &self.video_upload_timeout_secs)
            .field("batch_timeout_secs", &self.batch_timeout_secs)
            .field("max_concurrent_targets", &self.max_concurrent_targets)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("blob_bucket", &self.blob_bucket)
            .field("callback_max_retries", &self.callback_max_retries)
            .finish()
    }
}
