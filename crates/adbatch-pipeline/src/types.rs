use adbatch_platform::AdStatus;
use serde::Serialize;

use crate::stager::StagedAsset;

/// Report message when every unit succeeded.
pub const BATCH_COMPLETE: &str = "Batch complete";

/// What the caller asked the batch to create.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Ad account that owns the creatives and ads.
    pub account_id: String,
    /// Ad set ids; duplicates are ignored, first-seen order is kept.
    pub targets: Vec<String>,
    pub name_prefix: String,
    /// Used verbatim when the batch is exactly one asset and one target.
    pub ad_name: Option<String>,
    pub status: AdStatus,
    /// Host videos in this blob bucket and upload them by URL.
    pub blob_bucket: Option<String>,
}

impl BatchRequest {
    /// Targets trimmed, de-duplicated, in first-seen order.
    #[must_use]
    pub fn normalized_targets(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.targets
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(*t))
            .map(str::to_owned)
            .collect()
    }

    /// Ad name for `asset`: the explicit name for a single pair, otherwise
    /// `"{prefix} - {stem}"`.
    #[must_use]
    pub fn ad_name_for(&self, asset: &StagedAsset, single_pair: bool) -> String {
        if single_pair {
            if let Some(name) = self.ad_name.as_deref().map(str::trim) {
                if !name.is_empty() {
                    return name.to_owned();
                }
            }
        }
        let prefix = self.name_prefix.trim();
        if prefix.is_empty() {
            asset.stem().to_owned()
        } else {
            format!("{prefix} - {}", asset.stem())
        }
    }
}

/// Where a single (asset, target) unit of work got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    Pending,
    VideoUploaded,
    TemplateResolved,
    CreativeCreated,
    AdCreated,
}

impl std::fmt::Display for UnitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            UnitStage::Pending => "pending",
            UnitStage::VideoUploaded => "video_uploaded",
            UnitStage::TemplateResolved => "template_resolved",
            UnitStage::CreativeCreated => "creative_created",
            UnitStage::AdCreated => "ad_created",
        };
        f.write_str(label)
    }
}

/// Aggregate outcome of a batch. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub message: String,
    /// Created ad ids, ordered by asset then target.
    pub success: Vec<String>,
    /// Human-readable failure descriptions in the same order.
    pub failures: Vec<String>,
}

impl BatchReport {
    #[must_use]
    pub fn new(success: Vec<String>, failures: Vec<String>) -> Self {
        let message = if failures.is_empty() {
            BATCH_COMPLETE.to_owned()
        } else {
            format!(
                "Batch finished with {} failure(s); {} ad(s) created",
                failures.len(),
                success.len()
            )
        };
        Self {
            message,
            success,
            failures,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(targets: &[&str]) -> BatchRequest {
        BatchRequest {
            account_id: "42".to_owned(),
            targets: targets.iter().map(|t| (*t).to_owned()).collect(),
            name_prefix: "Spring".to_owned(),
            ad_name: Some("Hero ad".to_owned()),
            status: AdStatus::Paused,
            blob_bucket: None,
        }
    }

    #[test]
    fn normalized_targets_dedupes_and_keeps_order() {
        let req = request(&["b", " a ", "b", "", "c", "a"]);
        assert_eq!(req.normalized_targets(), vec!["b", "a", "c"]);
    }

    #[test]
    fn report_message_reflects_failures() {
        let ok = BatchReport::new(vec!["1".into(), "2".into()], vec![]);
        assert_eq!(ok.message, BATCH_COMPLETE);
        assert!(ok.is_complete());

        let partial = BatchReport::new(vec!["1".into()], vec!["boom".into()]);
        assert_eq!(partial.message, "Batch finished with 1 failure(s); 1 ad(s) created");
        assert!(!partial.is_complete());
    }

    #[test]
    fn unit_stage_labels() {
        assert_eq!(UnitStage::TemplateResolved.to_string(), "template_resolved");
        assert_eq!(UnitStage::AdCreated.to_string(), "ad_created");
    }
}
