//! Attachment resolution: image URLs → inline image bytes.
//!
//! Chat platforms hand us attachment URLs; the model wants the bytes. Only
//! image types on the configured allow-list are fetched. Anything that
//! fails is logged and left out, so a broken attachment never sinks the
//! whole turn.

use parley_config::DiscordConfig;
use parley_core::channel::Attachment;
use parley_core::error::ChannelError;
use parley_core::message::ContentPart;
use tracing::{debug, warn};

/// Inline image payloads above this size are refused.
const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Downloads supported image attachments.
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    client: reqwest::Client,
    supported_types: Vec<String>,
    max_bytes: u64,
}

impl AttachmentResolver {
    pub fn new(supported_types: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            supported_types: supported_types
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Self {
        Self::new(config.supported_image_types.clone())
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The MIME type we would send for `attachment`, if it is a supported image.
    pub fn supported_mime(&self, attachment: &Attachment) -> Option<String> {
        let mime = attachment
            .mime_type
            .as_deref()
            .map(|m| m.split(';').next().unwrap_or(m).trim().to_ascii_lowercase())
            .or_else(|| attachment.filename.as_deref().and_then(mime_from_filename))?;

        self.supported_types.contains(&mime).then_some(mime)
    }

    /// Fetch every supported image attachment, skipping failures.
    pub async fn resolve(&self, attachments: &[Attachment]) -> Vec<ContentPart> {
        let mut images = Vec::new();
        for attachment in attachments {
            let Some(mime) = self.supported_mime(attachment) else {
                debug!(url = %attachment.url, mime = ?attachment.mime_type, "Skipping unsupported attachment");
                continue;
            };
            match self.fetch(attachment, mime).await {
                Ok(part) => images.push(part),
                Err(e) => warn!(url = %attachment.url, error = %e, "Failed to fetch attachment"),
            }
        }
        images
    }

    async fn fetch(&self, attachment: &Attachment, mime: String) -> Result<ContentPart, ChannelError> {
        if attachment.size_bytes.is_some_and(|size| size > self.max_bytes) {
            return Err(ChannelError::Attachment(format!(
                "{} exceeds {} bytes",
                attachment.url, self.max_bytes
            )));
        }

        let response = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| ChannelError::Attachment(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChannelError::Attachment(format!(
                "HTTP {} for {}",
                response.status().as_u16(),
                attachment.url
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| ChannelError::Attachment(e.to_string()))?;

        if data.len() as u64 > self.max_bytes {
            return Err(ChannelError::Attachment(format!(
                "{} exceeds {} bytes",
                attachment.url, self.max_bytes
            )));
        }

        Ok(ContentPart::image(mime, data.to_vec()))
    }
}

fn mime_from_filename(filename: &str) -> Option<String> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => return None,
    };
    Some(mime.to_string())
}
