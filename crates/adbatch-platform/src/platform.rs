use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{AdAccount, Campaign, NewAd, NewCreative, RawCreative, VideoSource};

/// Capabilities the batch pipeline needs from the ads platform.
///
/// Every call may fail with a [`PlatformError`]; none are retried
/// automatically. Implementations must be shareable across concurrent
/// units of work.
#[async_trait]
pub trait AdsPlatform: Send + Sync {
    /// Uploads one video to the ad account and returns its video id.
    async fn upload_video(
        &self,
        account_id: &str,
        source: &VideoSource,
        filename: &str,
    ) -> Result<String, PlatformError>;

    /// Uploads a thumbnail image and returns its image hash.
    async fn upload_image(
        &self,
        account_id: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, PlatformError>;

    /// Most recent ad under `target` whose creative exposes an object story
    /// spec, or `None` when no such ad exists.
    async fn recent_ad_creative(&self, target: &str) -> Result<Option<RawCreative>, PlatformError>;

    async fn create_creative(
        &self,
        account_id: &str,
        creative: &NewCreative,
    ) -> Result<String, PlatformError>;

    async fn create_ad(&self, account_id: &str, ad: &NewAd) -> Result<String, PlatformError>;

    async fn list_ad_accounts(&self) -> Result<Vec<AdAccount>, PlatformError>;

    /// Active campaigns under the account.
    async fn list_campaigns(&self, account_id: &str) -> Result<Vec<Campaign>, PlatformError>;
}
