use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use adbatch_platform::{AdAccount, Campaign, PlatformError, RawCreative};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use serde_json::json;

use super::*;
use crate::blob::ObjectStoreBlobStore;
use crate::stager::AssetStager;
use crate::types::BATCH_COMPLETE;

#[derive(Default)]
struct Calls {
    uploads: Vec<(String, VideoSource)>,
    images: usize,
    lookups: Vec<String>,
    creatives: Vec<NewCreative>,
    ads: Vec<NewAd>,
}

/// In-memory platform that records every call.
#[derive(Default)]
struct FakePlatform {
    calls: Mutex<Calls>,
    no_template: HashSet<String>,
    failing_uploads: HashSet<String>,
    failing_ads: HashSet<String>,
    fail_thumbnail: bool,
    /// Per-target latency added to ad creation.
    delays: HashMap<String, Duration>,
}

impl FakePlatform {
    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AdsPlatform for FakePlatform {
    async fn upload_video(
        &self,
        _account_id: &str,
        source: &VideoSource,
        filename: &str,
    ) -> Result<String, PlatformError> {
        self.calls()
            .uploads
            .push((filename.to_owned(), source.clone()));
        if self.failing_uploads.contains(filename) {
            return Err(PlatformError::Api {
                status: 400,
                code: Some(6001),
                subcode: None,
                message: "There was a problem uploading your video file".to_owned(),
            });
        }
        Ok(format!("vid-{filename}"))
    }

    async fn upload_image(
        &self,
        _account_id: &str,
        _bytes: Vec<u8>,
        _filename: &str,
    ) -> Result<String, PlatformError> {
        self.calls().images += 1;
        if self.fail_thumbnail {
            return Err(PlatformError::Timeout {
                operation: "upload image".to_owned(),
            });
        }
        Ok("thumb-hash".to_owned())
    }

    async fn recent_ad_creative(&self, target: &str) -> Result<Option<RawCreative>, PlatformError> {
        self.calls().lookups.push(target.to_owned());
        if self.no_template.contains(target) {
            return Ok(None);
        }
        let spec = serde_json::from_value(json!({
            "page_id": "page-1",
            "video_data": {
                "message": format!("Copy for {target}"),
                "call_to_action": { "type": "SHOP_NOW" },
                "video_id": "source-video",
                "image_hash": "source-hash",
                "image_url": "https://cdn.example.com/source.jpg"
            }
        }))
        .unwrap();
        Ok(Some(RawCreative {
            ad_id: format!("template-{target}"),
            creative_id: format!("template-cr-{target}"),
            name: None,
            object_story_spec: spec,
        }))
    }

    async fn create_creative(
        &self,
        _account_id: &str,
        creative: &NewCreative,
    ) -> Result<String, PlatformError> {
        let mut calls = self.calls();
        calls.creatives.push(creative.clone());
        Ok(format!("cr-{}", calls.creatives.len()))
    }

    async fn create_ad(&self, _account_id: &str, ad: &NewAd) -> Result<String, PlatformError> {
        if let Some(delay) = self.delays.get(&ad.adset_id) {
            tokio::time::sleep(*delay).await;
        }
        self.calls().ads.push(ad.clone());
        if self.failing_ads.contains(&ad.adset_id) {
            return Err(PlatformError::Api {
                status: 400,
                code: Some(100),
                subcode: None,
                message: "Invalid adset".to_owned(),
            });
        }
        Ok(format!("{}:{}", ad.adset_id, ad.name))
    }

    async fn list_ad_accounts(&self) -> Result<Vec<AdAccount>, PlatformError> {
        Ok(Vec::new())
    }

    async fn list_campaigns(&self, _account_id: &str) -> Result<Vec<Campaign>, PlatformError> {
        Ok(Vec::new())
    }
}

fn request(targets: &[&str]) -> BatchRequest {
    BatchRequest {
        account_id: "42".to_owned(),
        targets: targets.iter().map(|t| (*t).to_owned()).collect(),
        name_prefix: "Spring".to_owned(),
        ad_name: None,
        status: AdStatus::Paused,
        blob_bucket: None,
    }
}

async fn stage_batch(dir: &Path, videos: &[&str], thumbnail: Option<&str>) -> StagedBatch {
    let stager = AssetStager::new(dir, 1024 * 1024).await.unwrap();
    let mut batch = StagedBatch::new();
    for name in videos {
        let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"video-bytes",
        ))]);
        batch.push_video(stager.stage_stream(name, "video/mp4", body).await.unwrap());
    }
    if let Some(name) = thumbnail {
        let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"jpeg",
        ))]);
        batch.set_thumbnail(stager.stage_stream(name, "image/jpeg", body).await.unwrap());
    }
    batch
}

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn orchestrator(platform: &Arc<FakePlatform>) -> BatchOrchestrator {
    let platform: Arc<dyn AdsPlatform> = platform.clone();
    BatchOrchestrator::new(platform, OrchestratorConfig::default())
}

#[tokio::test]
async fn every_pair_succeeds_and_videos_upload_once() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip1.mp4", "clip2.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    assert_eq!(report.success.len(), 6);
    assert!(report.failures.is_empty());
    assert_eq!(report.message, BATCH_COMPLETE);

    let calls = platform.calls();
    let uploaded: Vec<&str> = calls.uploads.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(uploaded, vec!["clip1.mp4", "clip2.mp4"]);
    assert_eq!(calls.ads.len(), 6);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn templates_are_looked_up_once_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip1.mp4", "clip2.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    assert_eq!(report.success.len(), 6);
    let calls = platform.calls();
    let mut lookups = calls.lookups.clone();
    lookups.sort();
    assert_eq!(lookups, vec!["t1", "t2", "t3"]);
    assert!(calls
        .creatives
        .iter()
        .all(|c| c.object_story_spec.page_id.as_deref() == Some("page-1")));
}

#[tokio::test]
async fn failed_uploads_skip_template_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["bad.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        failing_uploads: HashSet::from(["bad.mp4".to_owned()]),
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2"]))
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(platform.calls().lookups.is_empty());
}

#[tokio::test]
async fn report_follows_asset_then_target_order() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["a.mp4", "b.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        delays: HashMap::from([
            ("t1".to_owned(), Duration::from_millis(60)),
            ("t2".to_owned(), Duration::from_millis(30)),
        ]),
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    assert_eq!(
        report.success,
        vec![
            "t1:Spring - a",
            "t2:Spring - a",
            "t3:Spring - a",
            "t1:Spring - b",
            "t2:Spring - b",
            "t3:Spring - b",
        ]
    );
}

#[tokio::test]
async fn target_without_template_fails_once_per_asset() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip1.mp4", "clip2.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        no_template: HashSet::from(["t2".to_owned()]),
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    assert_eq!(report.success.len(), 4);
    assert_eq!(report.failures.len(), 2);
    for (failure, asset) in report.failures.iter().zip(["clip1.mp4", "clip2.mp4"]) {
        assert!(
            failure.starts_with(&format!("Failed for target t2 on asset {asset}: ")),
            "got {failure}"
        );
        assert!(failure.contains("no template"), "got {failure}");
    }
    assert_ne!(report.message, BATCH_COMPLETE);
    assert_eq!(platform.calls().lookups.len(), 3);
}

#[tokio::test]
async fn single_pair_without_template_reports_one_failure() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        no_template: HashSet::from(["t1".to_owned()]),
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1"]))
        .await
        .unwrap();

    assert!(report.success.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("no template"));
    assert!(platform.calls().creatives.is_empty());
}

#[tokio::test]
async fn empty_batch_is_rejected_before_any_platform_call() {
    let platform = Arc::new(FakePlatform::default());

    let err = orchestrator(&platform)
        .run(StagedBatch::new(), &request(&["t1"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");
    let calls = platform.calls();
    assert!(calls.uploads.is_empty());
    assert!(calls.lookups.is_empty());
}

#[tokio::test]
async fn validation_failure_still_releases_staged_files() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], Some("thumb.jpg")).await;
    assert_eq!(staged_files(dir.path()), 2);
    let platform = Arc::new(FakePlatform::default());

    let err = orchestrator(&platform)
        .run(batch, &request(&[" ", ""]))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");
    assert_eq!(staged_files(dir.path()), 0);
    assert!(platform.calls().uploads.is_empty());
}

#[tokio::test]
async fn submitted_creatives_never_carry_source_media() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());

    orchestrator(&platform)
        .run(batch, &request(&["t1", "t2"]))
        .await
        .unwrap();

    let calls = platform.calls();
    assert_eq!(calls.creatives.len(), 2);
    for creative in &calls.creatives {
        let video = creative.object_story_spec.video_data.as_ref().unwrap();
        assert_eq!(video.video_id.as_deref(), Some("vid-clip.mp4"));
        assert_eq!(video.image_hash, None);
        assert_eq!(video.image_url, None);
        assert!(video.call_to_action.is_some());
        assert_eq!(creative.name, "Creative - Spring - clip");
    }
}

#[tokio::test]
async fn thumbnail_hash_is_injected_into_every_creative() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["a.mp4", "b.mp4"], Some("thumb.jpg")).await;
    let platform = Arc::new(FakePlatform::default());

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2"]))
        .await
        .unwrap();

    assert!(report.is_complete());
    let calls = platform.calls();
    assert_eq!(calls.images, 1, "thumbnail uploads once per batch");
    assert!(calls.creatives.iter().all(|c| {
        c.object_story_spec
            .video_data
            .as_ref()
            .and_then(|v| v.image_hash.as_deref())
            == Some("thumb-hash")
    }));
}

#[tokio::test]
async fn thumbnail_failure_is_reported_once_and_ads_still_created() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["a.mp4"], Some("thumb.jpg")).await;
    let platform = Arc::new(FakePlatform {
        fail_thumbnail: true,
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2"]))
        .await
        .unwrap();

    assert_eq!(report.success.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("Failed to upload thumbnail thumb.jpg"));
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn upload_failure_skips_only_that_asset() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["bad.mp4", "good.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        failing_uploads: HashSet::from(["bad.mp4".to_owned()]),
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    assert_eq!(report.success.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("Failed to upload asset bad.mp4: "));
    assert!(report.failures[0].contains("problem uploading"));
    assert!(platform
        .calls()
        .ads
        .iter()
        .all(|ad| ad.name == "Spring - good"));
}

#[tokio::test]
async fn ad_rejection_is_isolated_to_its_target() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        failing_ads: HashSet::from(["t1".to_owned()]),
        ..FakePlatform::default()
    });

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t2"]))
        .await
        .unwrap();

    assert_eq!(report.success, vec!["t2:Spring - clip"]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("Invalid adset"));
}

#[tokio::test]
async fn single_pair_uses_explicit_ad_name() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());
    let mut req = request(&["t1"]);
    req.ad_name = Some("Hero launch".to_owned());
    req.status = AdStatus::Active;

    orchestrator(&platform).run(batch, &req).await.unwrap();

    let calls = platform.calls();
    assert_eq!(calls.ads[0].name, "Hero launch");
    assert_eq!(calls.ads[0].status, AdStatus::Active);
    assert_eq!(calls.creatives[0].name, "Creative - Hero launch");
}

#[tokio::test]
async fn duplicate_targets_are_processed_once() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());

    let report = orchestrator(&platform)
        .run(batch, &request(&["t1", "t1", "t2"]))
        .await
        .unwrap();

    assert_eq!(report.success.len(), 2);
    assert_eq!(platform.calls().lookups.len(), 2);
}

#[tokio::test]
async fn expired_deadline_skips_unstarted_units() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());
    let config = OrchestratorConfig {
        max_concurrent_targets: 2,
        batch_timeout: Duration::ZERO,
    };
    let dyn_platform: Arc<dyn AdsPlatform> = platform.clone();

    let report = BatchOrchestrator::new(dyn_platform, config)
        .run(batch, &request(&["t1", "t2"]))
        .await
        .unwrap();

    assert!(report.success.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.contains("timed out")));
    assert!(platform.calls().uploads.is_empty());
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn deadline_mid_batch_keeps_finished_ads_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform {
        delays: HashMap::from([("t1".to_owned(), Duration::from_millis(300))]),
        ..FakePlatform::default()
    });
    let config = OrchestratorConfig {
        max_concurrent_targets: 1,
        batch_timeout: Duration::from_millis(100),
    };
    let dyn_platform: Arc<dyn AdsPlatform> = platform.clone();

    let report = BatchOrchestrator::new(dyn_platform, config)
        .run(batch, &request(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    assert_eq!(report.success, vec!["t1:Spring - clip"]);
    assert_eq!(report.failures.len(), 2);
    for (failure, target) in report.failures.iter().zip(["t2", "t3"]) {
        assert!(
            failure.starts_with(&format!("Failed for target {target} on asset clip.mp4: ")),
            "got {failure}"
        );
        assert!(failure.contains("timed out"), "got {failure}");
    }
    let calls = platform.calls();
    assert_eq!(calls.ads.len(), 1);
    assert_eq!(calls.creatives.len(), 1);
    assert_eq!(staged_files(dir.path()), 0);
}

#[tokio::test]
async fn blob_bucket_uploads_video_by_url() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());
    let memory = Arc::new(InMemory::new());
    let blob = ObjectStoreBlobStore::new().with_bucket(
        "media",
        memory,
        "https://media.example.com",
    );
    let mut req = request(&["t1"]);
    req.blob_bucket = Some("media".to_owned());

    let report = orchestrator(&platform)
        .with_blob_store(Arc::new(blob))
        .run(batch, &req)
        .await
        .unwrap();

    assert!(report.is_complete());
    let calls = platform.calls();
    match &calls.uploads[0].1 {
        VideoSource::Url(url) => {
            assert!(url.starts_with("https://media.example.com/uploads/"), "got {url}");
            assert!(url.ends_with("/clip.mp4"), "got {url}");
        }
        other => panic!("expected a URL upload, got {other:?}"),
    }
}

#[tokio::test]
async fn blob_bucket_without_store_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let batch = stage_batch(dir.path(), &["clip.mp4"], None).await;
    let platform = Arc::new(FakePlatform::default());
    let mut req = request(&["t1"]);
    req.blob_bucket = Some("media".to_owned());

    let err = orchestrator(&platform).run(batch, &req).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");
    assert_eq!(staged_files(dir.path()), 0);
}
