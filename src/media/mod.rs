//! Media normalization
//!
//! Turns downloadable Telegram attachments into something the model accepts:
//! either a decoded raster image or a MIME-tagged byte blob. Animated and
//! video stickers are flattened to a single PNG frame.

pub mod sticker;
pub mod tools;

use crate::chat::{Attachment, StickerFormat};
use async_trait::async_trait;
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tools::FrameExtractor;
use tracing::{debug, warn};

/// MIME type Telegram uses for voice notes
pub const VOICE_MIME: &str = "audio/ogg";
/// MIME tag for animated (Lottie) stickers
pub const STICKER_TGS_MIME: &str = "sticker/tgs";
/// MIME tag for video stickers
pub const STICKER_WEBM_MIME: &str = "sticker/webm";
/// MIME type of flattened sticker frames
pub const PNG_MIME: &str = "image/png";

/// Errors raised while fetching or transforming media
#[derive(Debug, Error)]
pub enum MediaError {
    /// File could not be fetched from Telegram
    #[error("Download failed: {0}")]
    Download(String),
    /// Payload is not in the expected format
    #[error("Decode failed: {0}")]
    Decode(String),
    /// External tool failed
    #[error("Tool failed: {0}")]
    Tool(String),
}

/// Normalized media ready to be sent to the model
#[derive(Clone)]
pub enum MediaBlob {
    /// Decoded raster image
    Image(DynamicImage),
    /// Raw bytes tagged with a MIME type
    Data {
        /// MIME type of `bytes`
        mime_type: String,
        /// Payload
        bytes: Vec<u8>,
    },
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(image) => write!(f, "Image({}x{})", image.width(), image.height()),
            Self::Data { mime_type, bytes } => write!(f, "Data({mime_type}, {} bytes)", bytes.len()),
        }
    }
}

impl MediaBlob {
    /// MIME type of the blob, if it is not a decoded image.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Image(_) => None,
            Self::Data { mime_type, .. } => Some(mime_type),
        }
    }
}

/// How an attachment should be treated after download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeHint {
    /// Gzipped Lottie animation
    AnimatedSticker,
    /// WEBM video sticker
    VideoSticker,
    /// Pass through with this MIME type
    Other(String),
}

impl MimeHint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AnimatedSticker => STICKER_TGS_MIME,
            Self::VideoSticker => STICKER_WEBM_MIME,
            Self::Other(mime) => mime,
        }
    }

    /// Parse a MIME string, recognising the sticker tags.
    #[must_use]
    pub fn parse(mime: &str) -> Self {
        match mime {
            STICKER_TGS_MIME => Self::AnimatedSticker,
            STICKER_WEBM_MIME => Self::VideoSticker,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Resolve the MIME hint for an attachment.
///
/// Photos and static stickers have none and are decoded as images.
#[must_use]
pub fn resolve_mime_hint(attachment: &Attachment) -> Option<MimeHint> {
    match attachment {
        Attachment::Voice(_) => Some(MimeHint::Other(VOICE_MIME.to_string())),
        Attachment::Audio(audio) => audio.mime_type.as_deref().map(MimeHint::parse),
        Attachment::Sticker(sticker) => match sticker.format {
            StickerFormat::Animated => Some(MimeHint::AnimatedSticker),
            StickerFormat::Video => Some(MimeHint::VideoSticker),
            StickerFormat::Static => None,
        },
        Attachment::Photo(_) => None,
    }
}

/// Reference to a downloadable attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Telegram file id
    pub file_id: String,
    /// Resolved MIME hint
    pub mime: Option<MimeHint>,
}

impl AttachmentRef {
    /// Build the reference for a message attachment.
    #[must_use]
    pub fn from_attachment(attachment: &Attachment) -> Option<Self> {
        attachment.file_id().map(|file_id| Self {
            file_id: file_id.to_string(),
            mime: resolve_mime_hint(attachment),
        })
    }
}

/// Source of attachment bytes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Download the file identified by `file_id`.
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>, MediaError>;
}

/// Converts attachments into [`MediaBlob`]s
#[derive(Clone)]
pub struct MediaNormalizer {
    tools: Arc<dyn FrameExtractor>,
}

impl MediaNormalizer {
    #[must_use]
    pub fn new(tools: Arc<dyn FrameExtractor>) -> Self {
        Self { tools }
    }

    /// Download and normalize one attachment.
    ///
    /// Returns `None` when the download fails or is empty, or when the payload
    /// cannot be transformed. Animated stickers only ever come back as PNG.
    pub async fn normalize(
        &self,
        source: &dyn FileSource,
        attachment: &AttachmentRef,
    ) -> Option<MediaBlob> {
        let data = match source.fetch(&attachment.file_id).await {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                debug!(file_id = %attachment.file_id, "Empty download, skipping media");
                return None;
            }
            Err(e) => {
                warn!(file_id = %attachment.file_id, "Media download failed: {e}");
                return None;
            }
        };

        let result = match &attachment.mime {
            Some(MimeHint::AnimatedSticker) => sticker::tgs_to_png(self.tools.as_ref(), &data)
                .await
                .map(png_blob),
            Some(MimeHint::VideoSticker) => sticker::webm_to_png(self.tools.as_ref(), &data)
                .await
                .map(png_blob),
            Some(MimeHint::Other(mime)) => Ok(MediaBlob::Data {
                mime_type: mime.clone(),
                bytes: data,
            }),
            None => image::load_from_memory(&data)
                .map(MediaBlob::Image)
                .map_err(|e| MediaError::Decode(e.to_string())),
        };

        result
            .inspect_err(|e| {
                let mime = attachment.mime.as_ref().map(MimeHint::as_str);
                warn!(file_id = %attachment.file_id, mime, "Media normalization failed: {e}");
            })
            .ok()
    }
}

fn png_blob(bytes: Vec<u8>) -> MediaBlob {
    MediaBlob::Data {
        mime_type: PNG_MIME.to_string(),
        bytes,
    }
}
