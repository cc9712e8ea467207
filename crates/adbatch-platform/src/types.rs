//! Request and response types for the ads platform.
//!
//! ## Creative object story spec
//!
//! Creatives read back from existing ads carry an `object_story_spec` whose
//! `video_data` block mixes reusable copy (`message`, `title`,
//! `call_to_action`) with fields that point at the *source* ad's media
//! (`video_id`, `image_hash`, `image_url`). Only the fields the pipeline reads
//! or rewrites are modelled; everything else is preserved verbatim through
//! the flattened `extra` maps so a round trip never drops platform data.
//!
//! ## Timestamps
//!
//! The platform renders `created_time` as `2024-05-01T12:30:00+0000`
//! (no colon in the offset), which is not RFC 3339.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Delivery status requested for a newly created ad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdStatus {
    #[default]
    Paused,
    Active,
}

impl AdStatus {
    /// Parses the caller-facing status flag (`paused` / `active`, any case).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paused" => Some(Self::Paused),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdStatus::Paused => write!(f, "PAUSED"),
            AdStatus::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Where the platform should take a video's bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// A local file streamed as the multipart `source` field.
    File {
        path: std::path::PathBuf,
        mime: String,
    },
    /// A URL the platform fetches itself (`file_url`).
    Url(String),
}

/// The structured story spec attached to a creative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_actor_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_data: Option<VideoData>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Video payload of an [`ObjectStorySpec`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The creative of the most recent usable ad under a campaign target.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCreative {
    pub ad_id: String,
    pub creative_id: String,
    pub name: Option<String>,
    pub object_story_spec: ObjectStorySpec,
}

/// Body for `POST /{account}/adcreatives`.
#[derive(Debug, Clone, Serialize)]
pub struct NewCreative {
    pub name: String,
    pub object_story_spec: ObjectStorySpec,
}

/// Body for `POST /{account}/ads`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAd {
    pub name: String,
    pub adset_id: String,
    pub creative_id: String,
    pub status: AdStatus,
}

impl Serialize for NewAd {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct CreativeRef<'a> {
            creative_id: &'a str,
        }
        #[derive(Serialize)]
        struct Wire<'a> {
            name: &'a str,
            adset_id: &'a str,
            creative: CreativeRef<'a>,
            status: AdStatus,
        }
        Wire {
            name: &self.name,
            adset_id: &self.adset_id,
            creative: CreativeRef {
                creative_id: &self.creative_id,
            },
            status: self.status,
        }
        .serialize(serializer)
    }
}

/// An ad account visible to the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An active campaign under an ad account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    /// Page promoted by the campaign, when it promotes one.
    pub page_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire envelopes (crate-internal)
// ---------------------------------------------------------------------------

/// `{"data": [...], "paging": {...}}` list envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

/// `{"id": "..."}` returned by every create call.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedId {
    pub id: String,
}

/// `{"images": {"<filename>": {"hash": "...", "url": "..."}}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ImageUploadResponse {
    #[serde(default)]
    pub images: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CampaignRow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub promoted_object: Option<PromotedObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PromotedObject {
    #[serde(default)]
    pub page_id: Option<String>,
}

impl From<CampaignRow> for Campaign {
    fn from(row: CampaignRow) -> Self {
        Campaign {
            id: row.id,
            name: row.name,
            page_id: row.promoted_object.and_then(|p| p.page_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdRow {
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub creative: Option<CreativeRow>,
}

impl AdRow {
    pub(crate) fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        self.created_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z").ok())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreativeRow {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub object_story_spec: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub error_user_msg: Option<String>,
}
