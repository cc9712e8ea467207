use adbatch_platform::PlatformError;
use thiserror::Error;

use crate::blob::BlobError;

/// Errors raised by the batch pipeline.
///
/// Only [`PipelineError::Validation`] aborts a whole batch; every other
/// variant is caught at the smallest unit of work and turned into a
/// failure-list entry.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request cannot start (no files, no targets, missing account).
    #[error("invalid batch request: {0}")]
    Validation(String),

    /// Staging or releasing a temporary file failed.
    #[error("I/O failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The campaign target has no prior ad usable as a creative template.
    #[error("no template ad available for target {target}: {reason}")]
    NoTemplateAvailable { target: String, reason: String },

    /// The platform rejected an upload, creative, or ad call.
    #[error("platform request failed: {0}")]
    Platform(PlatformError),

    /// A network call or the batch deadline ran out.
    #[error("timed out: {operation}")]
    Timeout { operation: String },

    /// Hosting an asset in the blob store failed.
    #[error("blob store failure: {0}")]
    Blob(#[from] BlobError),
}

impl From<PlatformError> for PipelineError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Timeout { operation } => PipelineError::Timeout { operation },
            other => PipelineError::Platform(other),
        }
    }
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }
}
