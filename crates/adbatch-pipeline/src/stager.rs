//! Temporary on-disk staging for uploaded assets.
//!
//! Bytes are fully written and fsynced before [`AssetStager::stage_stream`]
//! returns, so the platform client can reopen the file as often as it needs.
//! A [`StagedAsset`] owns its file: [`StagedAsset::release`] unlinks it and
//! is idempotent, and dropping an unreleased asset unlinks it too.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use crate::error::PipelineError;

/// Writes incoming uploads into a staging directory.
#[derive(Debug, Clone)]
pub struct AssetStager {
    dir: PathBuf,
    max_bytes: u64,
}

impl AssetStager {
    /// Creates the staging directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the directory cannot be created.
    pub async fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, PipelineError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PipelineError::io(format!("creating {}", dir.display()), e))?;
        Ok(Self { dir, max_bytes })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Streams `chunks` into a new temporary file.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] if the upload exceeds the size cap.
    /// - [`PipelineError::Io`] if the stream or the filesystem fails.
    ///
    /// The partial file is removed on every error path.
    pub async fn stage_stream<S, E>(
        &self,
        original_name: &str,
        mime: &str,
        chunks: S,
    ) -> Result<StagedAsset, PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let original_name = clean_file_name(original_name);
        let (file, temp_path) = self.create_temp(&original_name)?;
        let mut file = tokio::fs::File::from_std(file);
        let mut chunks = std::pin::pin!(chunks);
        let mut size: u64 = 0;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| {
                PipelineError::io(
                    format!("receiving {original_name}"),
                    std::io::Error::other(e),
                )
            })?;
            size += chunk.len() as u64;
            if size > self.max_bytes {
                return Err(PipelineError::Validation(format!(
                    "{original_name} exceeds the {} byte upload limit",
                    self.max_bytes
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::io(format!("writing {original_name}"), e))?;
        }

        file.sync_all()
            .await
            .map_err(|e| PipelineError::io(format!("syncing {original_name}"), e))?;

        tracing::debug!(
            asset = %original_name,
            size,
            path = %temp_path.display(),
            "asset staged"
        );

        Ok(StagedAsset::new(temp_path, original_name, size, mime.to_owned()))
    }

    /// Copies a local file into the staging directory.
    ///
    /// # Errors
    ///
    /// Same as [`Self::stage_stream`].
    pub async fn stage_file(&self, source: &Path) -> Result<StagedAsset, PipelineError> {
        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PipelineError::Validation(format!("{} is not a file path", source.display()))
            })?;
        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| PipelineError::io(format!("reading {}", source.display()), e))?
            .len();
        if size > self.max_bytes {
            return Err(PipelineError::Validation(format!(
                "{original_name} exceeds the {} byte upload limit",
                self.max_bytes
            )));
        }

        let (file, temp_path) = self.create_temp(&original_name)?;
        drop(file);
        tokio::fs::copy(source, &temp_path)
            .await
            .map_err(|e| PipelineError::io(format!("copying {}", source.display()), e))?;

        let mime = mime_for(&original_name).to_owned();
        Ok(StagedAsset::new(temp_path, original_name, size, mime))
    }

    fn create_temp(&self, original_name: &str) -> Result<(std::fs::File, TempPath), PipelineError> {
        let suffix = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let named = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&self.dir)
            .map_err(|e| PipelineError::io(format!("creating temp file for {original_name}"), e))?;
        Ok(named.into_parts())
    }
}

/// A staged upload: a temporary file plus the metadata the caller sent.
#[derive(Debug)]
pub struct StagedAsset {
    temp: Option<TempPath>,
    location: PathBuf,
    original_name: String,
    size: u64,
    mime: String,
}

impl StagedAsset {
    fn new(temp: TempPath, original_name: String, size: u64, mime: String) -> Self {
        let location = temp.to_path_buf();
        Self {
            temp: Some(temp),
            location,
            original_name,
            size,
            mime,
        }
    }

    /// Location of the staged bytes. Stale once released.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.location
    }

    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Original filename without its extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.original_name)
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.temp.is_none()
    }

    /// Unlinks the staged file.
    ///
    /// Returns `Ok(true)` when this call removed the file and `Ok(false)` when
    /// the asset was already released. A file that vanished underneath us
    /// counts as released.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the unlink itself fails; the asset is
    /// still marked released so the failure is not retried on drop.
    pub fn release(&mut self) -> Result<bool, PipelineError> {
        let Some(temp) = self.temp.take() else {
            return Ok(false);
        };
        match temp.close() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(PipelineError::io(
                format!("removing {}", self.location.display()),
                e,
            )),
        }
    }
}

/// Strips any directory components a client put in the filename.
fn clean_file_name(raw: &str) -> String {
    let base = raw.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(raw).trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_owned()
    } else {
        base.to_owned()
    }
}

/// Best-effort MIME type from the file extension.
#[must_use]
pub fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
