use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use http::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use tracing::debug;

use super::file::UploadFile;
use super::progress::UploadEvents;
use crate::client::AuthenticatedClient;
use crate::error::{ApiError, ApiResult};
use crate::models::{AccessCredential, UploadReceipt};

pub const UPLOAD_PATH: &str = "/receipts/upload";
const CHUNK_SIZE: usize = 64 * 1024;

/// Moves one file to the service in a single attempt.
///
/// Implementations report transfer ticks through `events.transfer` and map
/// a 401 to [`ApiError::Unauthorized`]; retrying is the session's business.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(
        &self,
        file: &UploadFile,
        credential: Option<&AccessCredential>,
        events: &UploadEvents,
    ) -> ApiResult<UploadReceipt>;
}

/// Multipart `POST /receipts/upload` over the shared reqwest client.
pub struct HttpUploadTransport {
    http: reqwest::Client,
    url: String,
    field_name: String,
}

impl HttpUploadTransport {
    pub fn new(client: &AuthenticatedClient, field_name: impl Into<String>) -> Self {
        Self {
            http: client.http().clone(),
            url: client.endpoint(UPLOAD_PATH),
            field_name: field_name.into(),
        }
    }

    fn form(&self, file: &UploadFile, events: &UploadEvents) -> ApiResult<Form> {
        let data = file.data().clone();
        let total = file.size();
        let events = events.clone();
        let mut sent = 0u64;

        // Ticks fire as hyper pulls each chunk off the stream.
        let chunks = stream::iter((0..data.len()).step_by(CHUNK_SIZE)).map(move |start| {
            let end = (start + CHUNK_SIZE).min(data.len());
            let chunk = data[start..end].to_vec();
            sent += chunk.len() as u64;
            events.transfer(sent, total);
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(chunks), total)
            .file_name(file.name.clone())
            .mime_str(&file.mime)
            .map_err(|e| ApiError::File(format!("invalid MIME type '{}': {}", file.mime, e)))?;
        Ok(Form::new().part(self.field_name.clone(), part))
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn send(
        &self,
        file: &UploadFile,
        credential: Option<&AccessCredential>,
        events: &UploadEvents,
    ) -> ApiResult<UploadReceipt> {
        let mut request = self.http.post(&self.url).multipart(self.form(file, events)?);
        if let Some(value) = credential.and_then(AccessCredential::header_value) {
            request = request.header(AUTHORIZATION, value);
        }

        debug!(
            "Uploading '{}' ({} bytes) to {} with token: {}",
            file.name,
            file.size(),
            self.url,
            if credential.is_some() { "Present" } else { "Absent" }
        );
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::from_status(status));
        }

        // Success is decided by the status; the body is informational.
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(serde_json::from_slice(&body).unwrap_or_else(|e| {
            debug!("Upload response body was not receipt metadata: {}", e);
            UploadReceipt::default()
        }))
    }
}
