//! Per-message metadata supplied by a channel.
//!
//! A message may carry an image of its own and may quote an earlier message,
//! which in turn may carry an image. `is_quoted` / `has_image` are derived
//! from which attachments are present, so a flag can never disagree with its
//! payload.

use crate::media::MediaRef;

/// Descriptive fields of an image attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub url: String,
    pub mime_type: String,
    pub caption: String,
}

impl ImageMetadata {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self { mime_type: mime_type.into(), ..Self::default() }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// An image plus the reference the media collaborator needs to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub meta: ImageMetadata,
    pub media: MediaRef,
}

impl ImageAttachment {
    pub fn new(meta: ImageMetadata, media: MediaRef) -> Self {
        Self { meta, media }
    }
}

/// The message being replied to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteMetadata {
    /// Quoted text (or caption, for quoted images).
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl QuoteMetadata {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), image: None }
    }

    pub fn image(text: impl Into<String>, image: ImageAttachment) -> Self {
        Self { text: text.into(), image: Some(image) }
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    pub image: Option<ImageAttachment>,
    pub quote: Option<QuoteMetadata>,
}

impl MessageMetadata {
    /// Plain text message: no image, no quote.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn quoting(mut self, quote: QuoteMetadata) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn is_quoted(&self) -> bool {
        self.quote.is_some()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Inbound call shape: who sent what, with which attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub sender: String,
    pub prompt: String,
    pub metadata: MessageMetadata,
}

impl ChatRequest {
    pub fn new(sender: impl Into<String>, prompt: impl Into<String>, metadata: MessageMetadata) -> Self {
        Self { sender: sender.into(), prompt: prompt.into(), metadata }
    }
}

/// Payload handed to the reply callback. `error` is set only on failure,
/// in which case `text` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self { text: text.into(), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { text: String::new(), error: Some(error.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(mime: &str) -> ImageAttachment {
        ImageAttachment::new(ImageMetadata::new(mime), MediaRef::new("ref-1"))
    }

    #[test]
    fn plain_message_has_no_flags() {
        let m = MessageMetadata::plain();
        assert!(!m.is_quoted());
        assert!(!m.has_image());
    }

    #[test]
    fn flags_follow_attachments() {
        let m = MessageMetadata::plain()
            .with_image(attachment("image/png"))
            .quoting(QuoteMetadata::text("earlier"));
        assert!(m.is_quoted());
        assert!(m.has_image());
        assert!(!m.quote.as_ref().unwrap().has_image());
    }

    #[test]
    fn quoted_image_reports_image() {
        let q = QuoteMetadata::image("a caption", attachment("image/jpeg"));
        assert!(q.has_image());
        assert_eq!(q.text, "a caption");
    }

    #[test]
    fn image_metadata_builder() {
        let meta = ImageMetadata::new("image/webp").with_caption("sunset").with_url("https://x/y");
        assert_eq!(meta.mime_type, "image/webp");
        assert_eq!(meta.caption, "sunset");
        assert_eq!(meta.url, "https://x/y");
    }

    #[test]
    fn reply_constructors() {
        assert_eq!(Reply::ok("hi"), Reply { text: "hi".into(), error: None });
        let r = Reply::failed("boom");
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.text.is_empty());
    }
}
