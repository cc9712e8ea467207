//! Creative templates derived from a target's most recent ad.
//!
//! The fetched [`CreativeTemplate`] is never edited. [`CreativeTemplate::sanitized`]
//! produces a fresh [`SanitizedTemplate`] with every field that points at the
//! source ad's media removed, and [`SanitizedTemplate::with_assets`] builds the
//! story spec submitted for the new creative.

use std::sync::Arc;

use adbatch_platform::{AdsPlatform, ObjectStorySpec, RawCreative, VideoData};

use crate::error::PipelineError;

/// A reusable creative read from an existing ad. Validated on construction:
/// it always has a page id and a video payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeTemplate {
    target: String,
    source_ad_id: String,
    spec: ObjectStorySpec,
}

impl CreativeTemplate {
    /// Validates `raw` as a template for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoTemplateAvailable`] if the story spec lacks
    /// a page id or a video payload.
    pub fn from_raw(target: &str, raw: RawCreative) -> Result<Self, PipelineError> {
        let unusable = |reason: &str| PipelineError::NoTemplateAvailable {
            target: target.to_owned(),
            reason: format!("ad {} {reason}", raw.ad_id),
        };

        let has_page = raw
            .object_story_spec
            .page_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        if !has_page {
            return Err(unusable("has no page id in its story spec"));
        }
        if raw.object_story_spec.video_data.is_none() {
            return Err(unusable("is not a video ad"));
        }

        Ok(Self {
            target: target.to_owned(),
            source_ad_id: raw.ad_id,
            spec: raw.object_story_spec,
        })
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn source_ad_id(&self) -> &str {
        &self.source_ad_id
    }

    #[must_use]
    pub fn spec(&self) -> &ObjectStorySpec {
        &self.spec
    }

    /// Copy of the template with the source ad's `video_id`, `image_hash`
    /// and `image_url` removed.
    #[must_use]
    pub fn sanitized(&self) -> SanitizedTemplate {
        let mut spec = self.spec.clone();
        let mut video = spec.video_data.take().unwrap_or_default();
        video.video_id = None;
        video.image_hash = None;
        video.image_url = None;
        SanitizedTemplate { spec, video }
    }
}

/// A template stripped of asset-identifying fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedTemplate {
    spec: ObjectStorySpec,
    video: VideoData,
}

impl SanitizedTemplate {
    #[must_use]
    pub fn video_data(&self) -> &VideoData {
        &self.video
    }

    /// Story spec pointing at `video_id`, plus `thumbnail_hash` when one was
    /// uploaded for this batch.
    #[must_use]
    pub fn with_assets(&self, video_id: &str, thumbnail_hash: Option<&str>) -> ObjectStorySpec {
        let mut video = self.video.clone();
        video.video_id = Some(video_id.to_owned());
        video.image_hash = thumbnail_hash.map(str::to_owned);

        let mut spec = self.spec.clone();
        spec.video_data = Some(video);
        spec
    }
}

/// Looks up creative templates through the ads platform.
#[derive(Clone)]
pub struct TemplateResolver {
    platform: Arc<dyn AdsPlatform>,
}

impl TemplateResolver {
    #[must_use]
    pub fn new(platform: Arc<dyn AdsPlatform>) -> Self {
        Self { platform }
    }

    /// Fetches and validates the template for `target`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NoTemplateAvailable`] if the target has no usable ad.
    /// - [`PipelineError::Platform`] / [`PipelineError::Timeout`] if the lookup fails.
    pub async fn resolve(&self, target: &str) -> Result<CreativeTemplate, PipelineError> {
        let raw = self.platform.recent_ad_creative(target).await?.ok_or_else(|| {
            PipelineError::NoTemplateAvailable {
                target: target.to_owned(),
                reason: "the ad set has no ads with an object story spec".to_owned(),
            }
        })?;

        let template = CreativeTemplate::from_raw(target, raw)?;
        tracing::debug!(
            adset = %target,
            source_ad = %template.source_ad_id,
            "creative template resolved"
        );
        Ok(template)
    }
}
