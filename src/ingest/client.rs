//! Analysis backend client.
//!
//! Endpoints:
//! - POST {upload_path}: multipart upload, field `file`, returns a session id
//! - GET {stream_path}: `text/event-stream` of insight events, resumable
//!   with `Last-Event-ID`

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiSettings;
use crate::error::StreamError;

use super::sse::{frame_stream, SseFrame};

/// Decoded frames of one stream connection
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<SseFrame, StreamError>> + Send>>;

/// Upload progress callback, percent 0-100
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Upload body is sent in chunks of this size so progress can be reported
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Response to a successful upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadAck {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub audio_duration_seconds: Option<f64>,
    #[serde(default)]
    pub audio_size_bytes: Option<u64>,
}

/// Transport to the analysis backend
#[async_trait]
pub trait InsightBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Upload an audio file, reporting progress as the body is sent
    async fn upload(&self, audio: &Path, progress: ProgressFn) -> Result<UploadAck, StreamError>;

    /// Open the event stream for a session.
    ///
    /// Client errors (4xx) are terminal `ServerError`s; anything else that
    /// prevents the stream from opening is a `StreamDisconnected`.
    async fn open_stream(
        &self,
        session_id: &str,
        last_event_id: Option<&str>,
    ) -> Result<FrameStream, StreamError>;
}

/// reqwest implementation of [`InsightBackend`]
pub struct HttpBackend {
    api: ApiSettings,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(api: ApiSettings) -> Self {
        Self {
            api,
            client: reqwest::Client::new(),
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("caf") => "audio/x-caf",
        _ => "application/octet-stream",
    }
}

fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) * 100) / total) as u8
}

#[async_trait]
impl InsightBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, audio: &Path, progress: ProgressFn) -> Result<UploadAck, StreamError> {
        let url = self.api.upload_url();

        let file_name = audio
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let file_bytes = tokio::fs::read(audio).await.map_err(|e| {
            StreamError::UploadFailed(format!("Failed to read {}: {}", audio.display(), e))
        })?;
        let total = file_bytes.len() as u64;

        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = file_bytes
            .chunks(UPLOAD_CHUNK_BYTES)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();

        let mut sent = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                progress(percent(sent, total));
            }
            chunk
        });

        let file_part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(file_name)
            .mime_str(mime_for(audio))
            .map_err(|e| StreamError::UploadFailed(e.to_string()))?;

        let form = Form::new().part("file", file_part);

        debug!(url = %url, bytes = total, "Uploading audio");

        let response = self
            .client
            .post(&url)
            .timeout(self.api.request_timeout())
            .multipart(form)
            .send()
            .await
            .map_err(|e| StreamError::UploadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::UploadFailed(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<UploadAck>()
            .await
            .map_err(|e| StreamError::UploadFailed(format!("Invalid upload response: {}", e)))
    }

    async fn open_stream(
        &self,
        session_id: &str,
        last_event_id: Option<&str>,
    ) -> Result<FrameStream, StreamError> {
        let url = self.api.stream_url(session_id);

        let mut request = self.client.get(&url).header(ACCEPT, "text/event-stream");
        if let Some(cursor) = last_event_id.filter(|cursor| !cursor.is_empty()) {
            request = request.header("Last-Event-ID", cursor);
        }

        debug!(url = %url, last_event_id = ?last_event_id, "Opening event stream");

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::StreamDisconnected(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::ServerError(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(StreamError::StreamDisconnected(format!("HTTP {}", status)));
        }

        Ok(Box::pin(frame_stream(response.bytes_stream())))
    }
}
