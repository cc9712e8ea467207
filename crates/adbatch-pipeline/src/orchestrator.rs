//! Fans staged assets out across campaign targets.
//!
//! Each video is uploaded once and each target's template is looked up once,
//! when the first video is ready. The targets for a video then run
//! concurrently, each walking the unit state machine in [`UnitStage`] order:
//! derive a creative from the cached template, create it, create the ad.
//! Later lookups would see ads this batch created, so templates are never
//! re-fetched mid-batch. A failing unit only
//! adds a line to the report. Nothing short of request validation aborts the
//! batch, and already created ads are never rolled back.

use std::sync::Arc;
use std::time::Duration;

use adbatch_core::AppConfig;
use adbatch_platform::{AdStatus, AdsPlatform, NewAd, NewCreative, VideoSource};
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::blob::BlobStore;
use crate::cleanup::StagedBatch;
use crate::error::PipelineError;
use crate::stager::StagedAsset;
use crate::template::{CreativeTemplate, TemplateResolver};
use crate::types::{BatchReport, BatchRequest, UnitStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Upper bound on targets processed at once for a single asset.
    pub max_concurrent_targets: usize,
    /// Units not started before this budget runs out are skipped.
    pub batch_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_targets: 4,
            batch_timeout: Duration::from_secs(600),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_targets: config.max_concurrent_targets.max(1),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
        }
    }
}

/// Runs batches against an injected [`AdsPlatform`] and optional [`BlobStore`].
#[derive(Clone)]
pub struct BatchOrchestrator {
    platform: Arc<dyn AdsPlatform>,
    resolver: TemplateResolver,
    blob: Option<Arc<dyn BlobStore>>,
    config: OrchestratorConfig,
}

/// Template lookup for one target, shared by every asset in the batch.
type TemplateLookup = Result<CreativeTemplate, Arc<PipelineError>>;

/// Why one (asset, target) unit stopped, and the last stage it completed.
#[derive(Debug)]
struct UnitFailure {
    reached: UnitStage,
    error: Arc<PipelineError>,
}

impl UnitFailure {
    fn at<E: Into<PipelineError>>(reached: UnitStage) -> impl FnOnce(E) -> Self {
        move |error| Self {
            reached,
            error: Arc::new(error.into()),
        }
    }
}

/// Everything a unit of work needs from its asset.
struct AssetUnit<'a> {
    account_id: &'a str,
    asset_name: &'a str,
    ad_name: &'a str,
    video_id: &'a str,
    thumbnail_hash: Option<&'a str>,
    status: AdStatus,
    deadline: Instant,
}

impl BatchOrchestrator {
    #[must_use]
    pub fn new(platform: Arc<dyn AdsPlatform>, config: OrchestratorConfig) -> Self {
        let resolver = TemplateResolver::new(Arc::clone(&platform));
        Self {
            platform,
            resolver,
            blob: None,
            config,
        }
    }

    /// Enables hosting videos in `blob` for requests that name a bucket.
    #[must_use]
    pub fn with_blob_store(mut self, blob: Arc<dyn BlobStore>) -> Self {
        self.blob = Some(blob);
        self
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs the batch and releases every staged file before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] when the batch cannot start: no
    /// videos, no targets, no account, or a blob bucket without a blob store.
    /// Every other failure is reported inside the returned [`BatchReport`].
    pub async fn run(
        &self,
        mut batch: StagedBatch,
        request: &BatchRequest,
    ) -> Result<BatchReport, PipelineError> {
        let outcome = self.execute(&batch, request).await;
        batch.release_all();
        outcome
    }

    async fn execute(
        &self,
        batch: &StagedBatch,
        request: &BatchRequest,
    ) -> Result<BatchReport, PipelineError> {
        let account_id = request.account_id.trim();
        let targets = self.validate(batch, request)?;
        let deadline = Instant::now() + self.config.batch_timeout;

        tracing::info!(
            account = %account_id,
            assets = batch.videos().len(),
            targets = targets.len(),
            status = %request.status,
            "batch started"
        );

        let mut success = Vec::new();
        let mut failures = Vec::new();

        let thumbnail_hash = match batch.thumbnail() {
            Some(thumb) => match self.upload_thumbnail(account_id, thumb).await {
                Ok(hash) => Some(hash),
                Err(e) => {
                    tracing::warn!(asset = %thumb.original_name(), error = %e, "thumbnail upload failed");
                    failures.push(format!(
                        "Failed to upload thumbnail {}: {e}",
                        thumb.original_name()
                    ));
                    None
                }
            },
            None => None,
        };

        let single_pair = batch.videos().len() == 1 && targets.len() == 1;
        let mut templates: Option<Vec<TemplateLookup>> = None;

        for asset in batch.videos() {
            let name = asset.original_name();

            if Instant::now() >= deadline {
                for target in &targets {
                    failures.push(unit_failure_line(target, name, &deadline_error()));
                }
                continue;
            }

            let video_id = match self.upload_asset(account_id, asset, request).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(asset = %name, error = %e, "video upload failed");
                    failures.push(format!("Failed to upload asset {name}: {e}"));
                    continue;
                }
            };

            if templates.is_none() {
                templates = Some(self.resolve_templates(&targets).await);
            }
            let Some(resolved) = templates.as_deref() else {
                continue;
            };

            let ad_name = request.ad_name_for(asset, single_pair);
            let unit = AssetUnit {
                account_id,
                asset_name: name,
                ad_name: &ad_name,
                video_id: &video_id,
                thumbnail_hash: thumbnail_hash.as_deref(),
                status: request.status,
                deadline,
            };

            let unit = &unit;
            let targets_ref = &targets;
            let mut outcomes: Vec<(usize, Result<String, UnitFailure>)> =
                stream::iter(0..targets.len())
                    .map(|idx| async move {
                        let outcome = self
                            .run_unit(unit, &targets_ref[idx], &resolved[idx])
                            .await;
                        (idx, outcome)
                    })
                    .buffer_unordered(self.config.max_concurrent_targets.max(1))
                    .collect()
                    .await;
            outcomes.sort_by_key(|(idx, _)| *idx);

            for (idx, outcome) in outcomes {
                let target = &targets[idx];
                match outcome {
                    Ok(ad_id) => success.push(ad_id),
                    Err(failure) => {
                        tracing::warn!(
                            adset = %target,
                            asset = %name,
                            stage = %failure.reached,
                            error = %failure.error,
                            "unit of work failed"
                        );
                        failures.push(unit_failure_line(target, name, &failure.error));
                    }
                }
            }
        }

        let report = BatchReport::new(success, failures);
        tracing::info!(
            created = report.success.len(),
            failed = report.failures.len(),
            "batch finished"
        );
        Ok(report)
    }

    /// Checks that `request` can start and returns its normalized targets.
    /// [`Self::run`] performs the same check; hosts call this to reject a
    /// request before handing it off.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] describing the first problem.
    pub fn validate(
        &self,
        batch: &StagedBatch,
        request: &BatchRequest,
    ) -> Result<Vec<String>, PipelineError> {
        if batch.is_empty() {
            return Err(PipelineError::Validation(
                "no video files were provided".to_owned(),
            ));
        }
        if request.account_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "an ad account id is required".to_owned(),
            ));
        }
        let targets = request.normalized_targets();
        if targets.is_empty() {
            return Err(PipelineError::Validation(
                "at least one campaign target is required".to_owned(),
            ));
        }
        if let Some(bucket) = request.blob_bucket.as_deref() {
            if self.blob.is_none() {
                return Err(PipelineError::Validation(format!(
                    "blob bucket '{bucket}' was requested but no blob store is configured"
                )));
            }
        }
        Ok(targets)
    }

    /// Looks up every target's template once, in target order.
    async fn resolve_templates(&self, targets: &[String]) -> Vec<TemplateLookup> {
        let mut resolved: Vec<(usize, TemplateLookup)> = stream::iter(0..targets.len())
            .map(|idx| async move {
                let lookup = self.resolver.resolve(&targets[idx]).await;
                if let Err(e) = &lookup {
                    tracing::debug!(adset = %targets[idx], error = %e, "no usable template");
                }
                (idx, lookup.map_err(Arc::new))
            })
            .buffer_unordered(self.config.max_concurrent_targets.max(1))
            .collect()
            .await;
        resolved.sort_by_key(|(idx, _)| *idx);
        resolved.into_iter().map(|(_, lookup)| lookup).collect()
    }

    async fn upload_thumbnail(
        &self,
        account_id: &str,
        thumb: &StagedAsset,
    ) -> Result<String, PipelineError> {
        let bytes = tokio::fs::read(thumb.path())
            .await
            .map_err(|e| PipelineError::io(format!("reading {}", thumb.original_name()), e))?;
        let hash = self
            .platform
            .upload_image(account_id, bytes, thumb.original_name())
            .await?;
        tracing::info!(asset = %thumb.original_name(), image_hash = %hash, "thumbnail uploaded");
        Ok(hash)
    }

    async fn upload_asset(
        &self,
        account_id: &str,
        asset: &StagedAsset,
        request: &BatchRequest,
    ) -> Result<String, PipelineError> {
        let source = match (self.blob.as_ref(), request.blob_bucket.as_deref()) {
            (Some(blob), Some(bucket)) => {
                let key = format!("uploads/{}/{}", uuid::Uuid::new_v4(), asset.original_name());
                VideoSource::Url(blob.put_file(bucket, &key, asset.path()).await?)
            }
            _ => VideoSource::File {
                path: asset.path().to_path_buf(),
                mime: asset.mime().to_owned(),
            },
        };

        let video_id = self
            .platform
            .upload_video(account_id, &source, asset.original_name())
            .await?;
        tracing::info!(
            asset = %asset.original_name(),
            size_bytes = asset.size(),
            video_id = %video_id,
            "video uploaded"
        );
        Ok(video_id)
    }

    async fn run_unit(
        &self,
        unit: &AssetUnit<'_>,
        target: &str,
        template: &TemplateLookup,
    ) -> Result<String, UnitFailure> {
        if Instant::now() >= unit.deadline {
            return Err(UnitFailure::at(UnitStage::Pending)(deadline_error()));
        }

        let template = template.as_ref().map_err(|error| UnitFailure {
            reached: UnitStage::VideoUploaded,
            error: Arc::clone(error),
        })?;

        let creative = NewCreative {
            name: format!("Creative - {}", unit.ad_name),
            object_story_spec: template
                .sanitized()
                .with_assets(unit.video_id, unit.thumbnail_hash),
        };
        let creative_id = self
            .platform
            .create_creative(unit.account_id, &creative)
            .await
            .map_err(UnitFailure::at(UnitStage::TemplateResolved))?;

        let ad = NewAd {
            name: unit.ad_name.to_owned(),
            adset_id: target.to_owned(),
            creative_id,
            status: unit.status,
        };
        let ad_id = self
            .platform
            .create_ad(unit.account_id, &ad)
            .await
            .map_err(UnitFailure::at(UnitStage::CreativeCreated))?;

        tracing::info!(
            adset = %target,
            asset = %unit.asset_name,
            ad_id = %ad_id,
            stage = %UnitStage::AdCreated,
            "ad created"
        );
        Ok(ad_id)
    }
}

fn deadline_error() -> PipelineError {
    PipelineError::Timeout {
        operation: "batch deadline reached before the unit started".to_owned(),
    }
}

fn unit_failure_line(target: &str, asset_name: &str, error: &PipelineError) -> String {
    format!("Failed for target {target} on asset {asset_name}: {error}")
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
