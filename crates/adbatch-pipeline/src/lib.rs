//! Batch ad-creation pipeline.
//!
//! Stages uploaded videos on disk, uploads each video to the ads platform
//! once, derives a creative per campaign target from that target's most
//! recent ad, creates the ad, and reports per-target successes and failures.
//! Staged files are released on every exit path.

pub mod blob;
pub mod cleanup;
pub mod error;
pub mod orchestrator;
pub mod stager;
pub mod template;
pub mod types;

pub use blob::{BlobError, BlobStore, ObjectStoreBlobStore};
pub use cleanup::StagedBatch;
pub use error::PipelineError;
pub use orchestrator::{BatchOrchestrator, OrchestratorConfig};
pub use stager::{AssetStager, StagedAsset};
pub use template::{CreativeTemplate, SanitizedTemplate, TemplateResolver};
pub use types::{BatchReport, BatchRequest, UnitStage};
