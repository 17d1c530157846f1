//! Persona text and prompt assembly.
//!
//! The persona is applied twice: once as the model's system instruction and
//! again as a flair line in front of every prompt. Both are intentional.

use super::metadata::{ImageAttachment, MessageMetadata};

/// System instruction given to the model at construction time.
/// Starts with a newline; `\x20` keeps the trailing space after the emojis.
pub const PERSONA_INSTRUCTION: &str = "
You're a witty, GenZ-style AI chatbot who loves memes, emojis, and internet slang.
Always reply casually, throw in some emojis, and keep it fun 😎🔥.\x20
Avoid sounding too formal or robotic. If something's funny, make a joke. If you don't know, say \"idk lol 🤷‍♀️\" my question is:
";

/// Prepended to every outgoing prompt.
pub const PERSONA_FLAIR: &str = "Talk like a GenZ internet buddy, chill vibes only 😎:\n";

/// Reply text for images outside [`ALLOWED_IMAGE_TYPES`].
pub const INVALID_IMAGE_REPLY: &str = "The image is not a valid image type.";

/// Prefix of the error string handed to the reply callback.
pub const ERROR_LABEL: &str = "[Error] An error occurred. Check the console for details.\n[Message]: ";

/// Exact, case-sensitive MIME allow-list for image prompts.
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/jpg", "image/webp"];

pub fn is_allowed_image_type(mime_type: &str) -> bool {
    ALLOWED_IMAGE_TYPES.contains(&mime_type)
}

/// Full prompt sent to the model: flair, then either the quoted block or
/// the raw prompt. Quoted images are not inlined as text.
pub fn build_prompt(prompt: &str, metadata: &MessageMetadata) -> String {
    let body = match &metadata.quote {
        Some(quote) if !quote.has_image() => {
            format!("Quoted Message:\n{}\n---\nMessage:\n{prompt}", quote.text)
        }
        _ => prompt.to_string(),
    };
    format!("{PERSONA_FLAIR}{body}")
}

/// Which completion path a message takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// Reply to an image: single-turn image completion on the quoted image.
    QuotedImage(&'a ImageAttachment),
    /// Reply to text: session completion with the quoted block.
    QuotedText,
    /// Image message: single-turn image completion.
    Image(&'a ImageAttachment),
    /// Plain text: session completion.
    Text,
}

/// A quote takes precedence over the message's own image.
pub fn route(metadata: &MessageMetadata) -> Route<'_> {
    match (&metadata.quote, &metadata.image) {
        (Some(quote), _) => match &quote.image {
            Some(image) => Route::QuotedImage(image),
            None => Route::QuotedText,
        },
        (None, Some(image)) => Route::Image(image),
        (None, None) => Route::Text,
    }
}
