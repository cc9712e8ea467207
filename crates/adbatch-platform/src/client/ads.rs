//! Template lookup plus creative and ad creation.

use crate::error::PlatformError;
use crate::types::{AdRow, CreatedId, ListEnvelope, NewAd, NewCreative, ObjectStorySpec, RawCreative};

use super::{account_segment, validate_id, GraphClient};

/// How many recent ads are inspected when looking for a template.
const TEMPLATE_SCAN_LIMIT: &str = "25";

impl GraphClient {
    /// Finds the most recent ad under `target` whose creative carries an
    /// `object_story_spec`.
    ///
    /// Ads are ordered newest first by `created_time`; ads without a
    /// parseable timestamp keep their response order after the dated ones.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::InvalidId`] if `target` is not a bare identifier.
    /// - [`PlatformError::Api`] / [`PlatformError::Timeout`] on request failure.
    /// - [`PlatformError::Deserialize`] if a story spec has an unexpected shape.
    pub async fn recent_ad_creative(
        &self,
        target: &str,
    ) -> Result<Option<RawCreative>, PlatformError> {
        let target = validate_id(target)?;
        let mut url = self.endpoint(&format!("{target}/ads"))?;
        url.query_pairs_mut()
            .append_pair(
                "fields",
                "id,name,created_time,creative{id,name,object_story_spec}",
            )
            .append_pair("limit", TEMPLATE_SCAN_LIMIT);

        let envelope: ListEnvelope<AdRow> =
            Self::send_json(self.get(url), &format!("list ads for {target}")).await?;

        let mut ads = envelope.data;
        ads.sort_by_key(|ad| std::cmp::Reverse(ad.created_at()));

        for ad in ads {
            let Some(creative) = ad.creative else {
                continue;
            };
            let Some(raw_spec) = creative.object_story_spec else {
                continue;
            };
            if raw_spec.is_null() {
                continue;
            }
            let spec: ObjectStorySpec =
                serde_json::from_value(raw_spec).map_err(|e| PlatformError::Deserialize {
                    context: format!("object_story_spec of creative {}", creative.id),
                    source: e,
                })?;
            return Ok(Some(RawCreative {
                ad_id: ad.id,
                creative_id: creative.id,
                name: creative.name,
                object_story_spec: spec,
            }));
        }

        Ok(None)
    }

    /// Creates a creative under the account and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Api`] when the platform rejects the spec.
    pub async fn create_creative(
        &self,
        account_id: &str,
        creative: &NewCreative,
    ) -> Result<String, PlatformError> {
        let url = self.endpoint(&format!("{}/adcreatives", account_segment(account_id)?))?;
        let created: CreatedId =
            Self::send_json(self.post(url).json(creative), "create creative").await?;
        Ok(created.id)
    }

    /// Creates an ad under the account and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Api`] when the platform rejects the ad.
    pub async fn create_ad(&self, account_id: &str, ad: &NewAd) -> Result<String, PlatformError> {
        let url = self.endpoint(&format!("{}/ads", account_segment(account_id)?))?;
        let created: CreatedId = Self::send_json(self.post(url).json(ad), "create ad").await?;
        Ok(created.id)
    }
}
