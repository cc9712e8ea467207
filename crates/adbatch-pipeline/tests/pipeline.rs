//! End-to-end batch runs against a mocked Graph API.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adbatch_platform::{AdStatus, AdsPlatform, GraphClient, GraphClientConfig};
use adbatch_pipeline::{
    AssetStager, BatchOrchestrator, BatchRequest, OrchestratorConfig, StagedBatch,
};

fn graph_client(base_url: &str) -> Arc<dyn AdsPlatform> {
    let mut config = GraphClientConfig::new("test-token");
    config.base_url = base_url.to_owned();
    config.request_timeout = Duration::from_secs(5);
    config.upload_timeout = Duration::from_secs(5);
    Arc::new(GraphClient::new(&config).expect("client construction should not fail"))
}

async fn staged(dir: &std::path::Path, names: &[&str]) -> StagedBatch {
    let stager = AssetStager::new(dir, 1024 * 1024).await.unwrap();
    let mut batch = StagedBatch::new();
    for name in names {
        let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"fake-video-bytes",
        ))]);
        batch.push_video(stager.stage_stream(name, "video/mp4", body).await.unwrap());
    }
    batch
}

fn template_ads() -> Value {
    json!({
        "data": [{
            "id": "ad-template",
            "created_time": "2024-04-01T10:00:00+0000",
            "creative": {
                "id": "cr-template",
                "object_story_spec": {
                    "page_id": "page-1",
                    "video_data": {
                        "message": "Fresh drop",
                        "video_id": "old-video",
                        "image_hash": "old-hash",
                        "image_url": "https://cdn.example.com/old.jpg"
                    }
                }
            }
        }]
    })
}

#[tokio::test]
async fn batch_creates_ads_and_reports_targets_without_templates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v19.0/act_42/advideos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vid-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v19.0/2385/ads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(template_ads()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v19.0/9999/ads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v19.0/act_42/adcreatives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cr-new"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v19.0/act_42/ads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ad-new"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let batch = staged(dir.path(), &["promo.mp4"]).await;
    let orchestrator =
        BatchOrchestrator::new(graph_client(&server.uri()), OrchestratorConfig::default());
    let request = BatchRequest {
        account_id: "42".to_owned(),
        targets: vec!["2385".to_owned(), "9999".to_owned()],
        name_prefix: "Spring".to_owned(),
        ad_name: None,
        status: AdStatus::Paused,
        blob_bucket: None,
    };

    let report = orchestrator.run(batch, &request).await.unwrap();

    assert_eq!(report.success, vec!["ad-new"]);
    assert_eq!(report.failures.len(), 1);
    assert!(
        report.failures[0].starts_with("Failed for target 9999 on asset promo.mp4"),
        "got {}",
        report.failures[0]
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let requests = server.received_requests().await.unwrap();
    let creative = requests
        .iter()
        .find(|r| r.url.path() == "/v19.0/act_42/adcreatives")
        .expect("creative request");
    let body: Value = serde_json::from_slice(&creative.body).unwrap();
    assert_eq!(body["name"], "Creative - Spring - promo");
    assert_eq!(body["object_story_spec"]["video_data"]["video_id"], "vid-1");
    assert_eq!(body["object_story_spec"]["video_data"]["message"], "Fresh drop");
    assert!(body["object_story_spec"]["video_data"].get("image_hash").is_none());
    assert!(body["object_story_spec"]["video_data"].get("image_url").is_none());

    let ad = requests
        .iter()
        .find(|r| r.url.path() == "/v19.0/act_42/ads")
        .expect("ad request");
    let body: Value = serde_json::from_slice(&ad.body).unwrap();
    assert_eq!(body["adset_id"], "2385");
    assert_eq!(body["creative"]["creative_id"], "cr-new");
    assert_eq!(body["status"], "PAUSED");
}

#[tokio::test]
async fn rejected_upload_is_reported_without_touching_targets() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v19.0/act_42/advideos"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "File format not supported", "code": 352 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v19.0/2385/ads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(template_ads()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let batch = staged(dir.path(), &["promo.mkv"]).await;
    let orchestrator =
        BatchOrchestrator::new(graph_client(&server.uri()), OrchestratorConfig::default());
    let request = BatchRequest {
        account_id: "act_42".to_owned(),
        targets: vec!["2385".to_owned()],
        name_prefix: "Spring".to_owned(),
        ad_name: None,
        status: AdStatus::Active,
        blob_bucket: None,
    };

    let report = orchestrator.run(batch, &request).await.unwrap();

    assert!(report.success.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("File format not supported"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
