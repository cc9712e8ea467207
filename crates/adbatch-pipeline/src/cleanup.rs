//! Ownership of every staged file in a batch.
//!
//! A [`StagedBatch`] is handed to the orchestrator by value. Whatever path the
//! run takes, the files are released: explicitly through
//! [`StagedBatch::release_all`], or by `Drop` on early return, panic or
//! cancellation of the surrounding future.

use crate::stager::StagedAsset;

#[derive(Debug, Default)]
pub struct StagedBatch {
    videos: Vec<StagedAsset>,
    thumbnail: Option<StagedAsset>,
}

impl StagedBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_video(&mut self, asset: StagedAsset) {
        self.videos.push(asset);
    }

    /// Replaces the thumbnail; a previous one is released immediately.
    pub fn set_thumbnail(&mut self, asset: StagedAsset) {
        if let Some(mut previous) = self.thumbnail.replace(asset) {
            release_logged(&mut previous);
        }
    }

    #[must_use]
    pub fn videos(&self) -> &[StagedAsset] {
        &self.videos
    }

    #[must_use]
    pub fn thumbnail(&self) -> Option<&StagedAsset> {
        self.thumbnail.as_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Releases every asset still held. Returns how many files this call
    /// removed. Failures are logged, never returned.
    pub fn release_all(&mut self) -> usize {
        let mut removed = 0;
        for asset in self.videos.iter_mut().chain(self.thumbnail.as_mut()) {
            if release_logged(asset) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "staged assets released");
        }
        removed
    }
}

impl Drop for StagedBatch {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn release_logged(asset: &mut StagedAsset) -> bool {
    match asset.release() {
        Ok(removed) => removed,
        Err(e) => {
            tracing::warn!(
                asset = %asset.original_name(),
                error = %e,
                "failed to remove staged asset"
            );
            false
        }
    }
}
