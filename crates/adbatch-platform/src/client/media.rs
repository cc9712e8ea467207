//! Video and image uploads.

use reqwest::multipart::{Form, Part};
use reqwest::Body;
use tokio_util::io::ReaderStream;

use crate::error::PlatformError;
use crate::types::{CreatedId, ImageUploadResponse, VideoSource};

use super::{account_segment, GraphClient};

impl GraphClient {
    /// Uploads one video to `POST /{account}/advideos` and returns its id.
    ///
    /// Files are streamed from disk rather than buffered. The call is bounded
    /// by the upload timeout instead of the general request timeout.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::Io`] if a local source file cannot be opened.
    /// - [`PlatformError::Api`] if the platform rejects the upload.
    /// - [`PlatformError::Timeout`] if the upload exceeds its budget.
    pub async fn upload_video(
        &self,
        account_id: &str,
        source: &VideoSource,
        filename: &str,
    ) -> Result<String, PlatformError> {
        let url = self.endpoint(&format!("{}/advideos", account_segment(account_id)?))?;

        let form = Form::new().text("name", filename.to_owned());
        let form = match source {
            VideoSource::File { path, mime } => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| PlatformError::Io {
                        context: path.display().to_string(),
                        source: e,
                    })?;
                let len = file
                    .metadata()
                    .await
                    .map_err(|e| PlatformError::Io {
                        context: path.display().to_string(),
                        source: e,
                    })?
                    .len();
                let body = Body::wrap_stream(ReaderStream::new(file));
                let part = Part::stream_with_length(body, len)
                    .file_name(filename.to_owned())
                    .mime_str(mime)?;
                form.part("source", part)
            }
            VideoSource::Url(file_url) => form.text("file_url", file_url.clone()),
        };

        tracing::debug!(account = account_id, filename, "uploading video");
        let created: CreatedId = Self::send_json(
            self.post(url).multipart(form).timeout(self.upload_timeout),
            "upload video",
        )
        .await?;
        Ok(created.id)
    }

    /// Uploads a thumbnail to `POST /{account}/adimages` and returns its hash.
    ///
    /// # Errors
    ///
    /// - [`PlatformError::Api`] if the platform rejects the image.
    /// - [`PlatformError::UnexpectedResponse`] if no hash comes back.
    pub async fn upload_image(
        &self,
        account_id: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, PlatformError> {
        let url = self.endpoint(&format!("{}/adimages", account_segment(account_id)?))?;
        let part = Part::bytes(bytes).file_name(filename.to_owned());
        let form = Form::new().part("filename", part);

        let response: ImageUploadResponse =
            Self::send_json(self.post(url).multipart(form), "upload image").await?;

        // One image per request, keyed by whatever name the platform chose.
        response
            .images
            .values()
            .find_map(|image| image.get("hash").and_then(serde_json::Value::as_str))
            .map(str::to_owned)
            .ok_or_else(|| PlatformError::UnexpectedResponse {
                operation: "upload image".to_owned(),
                reason: "response carried no image hash".to_owned(),
            })
    }
}
