use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use shared::{
    domain::{AttachmentDescriptor, ChatId, MessageId},
    protocol::EncodedAttachment,
};
use tracing::{info, warn};
use url::Url;

use crate::{backend::MessagingBackend, error::SyncError};

const PHOTO_MIME: &str = "image/jpeg";
const VIDEO_MIME: &str = "video/mp4";
const DEFAULT_PHOTO_FILENAME: &str = "photo.jpg";

/// Fetches one attachment payload on demand. Nothing is cached.
pub struct AttachmentGateway {
    backend: Arc<dyn MessagingBackend>,
    http: Client,
}

impl AttachmentGateway {
    pub fn new(backend: Arc<dyn MessagingBackend>, download_timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(download_timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!("attachments: falling back to default http client: {err}");
                Client::new()
            });
        Self { backend, http }
    }

    /// `None` on any failure; the reason is logged.
    pub async fn get_attachment(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        descriptor: &AttachmentDescriptor,
    ) -> Option<EncodedAttachment> {
        match self.fetch(chat_id, message_id, descriptor).await {
            Ok(attachment) => {
                info!(
                    chat_id = chat_id.0,
                    message_id = message_id.0,
                    mime_type = %attachment.mime_type,
                    filename = %attachment.filename,
                    "attachments: fetched"
                );
                Some(attachment)
            }
            Err(err) => {
                warn!(
                    chat_id = chat_id.0,
                    message_id = message_id.0,
                    "attachments: fetch failed: {err}"
                );
                None
            }
        }
    }

    async fn fetch(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        descriptor: &AttachmentDescriptor,
    ) -> Result<EncodedAttachment, SyncError> {
        let (bytes, mime_type, filename) = match descriptor {
            AttachmentDescriptor::Photo { base_url } => {
                let raw = base_url
                    .as_deref()
                    .ok_or_else(|| SyncError::validation("photo attachment missing baseUrl"))?;
                let url = Url::parse(raw)
                    .map_err(|err| SyncError::validation(format!("invalid photo url: {err}")))?;
                let filename = photo_filename(&url);
                let bytes = self.download(url).await?;
                (bytes, PHOTO_MIME.to_string(), filename)
            }
            AttachmentDescriptor::Video { video_id } => {
                let video_id = video_id
                    .as_deref()
                    .ok_or_else(|| SyncError::validation("video attachment missing videoId"))?;
                let bytes = self
                    .backend
                    .fetch_video(video_id)
                    .await
                    .with_context(|| format!("fetch video {video_id}"))?;
                (bytes, VIDEO_MIME.to_string(), format!("{video_id}.mp4"))
            }
            AttachmentDescriptor::File { file_id } => {
                let file_id = file_id
                    .as_deref()
                    .ok_or_else(|| SyncError::validation("file attachment missing fileId"))?;
                let (bytes, filename) = self
                    .backend
                    .fetch_file(file_id, chat_id, message_id)
                    .await
                    .with_context(|| format!("fetch file {file_id}"))?;
                (bytes, mime_for_filename(&filename), filename)
            }
            AttachmentDescriptor::Unknown => {
                return Err(SyncError::validation("unsupported attachment type"));
            }
        };

        Ok(EncodedAttachment {
            mime_type,
            filename,
            content_b64: STANDARD.encode(bytes),
        })
    }

    async fn download(&self, url: Url) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("download {url}"))?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn photo_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_PHOTO_FILENAME.to_string())
}

fn mime_for_filename(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
#[path = "tests/attachments_tests.rs"]
mod tests;
