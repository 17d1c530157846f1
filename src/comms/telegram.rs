//! Telegram comms channel: receives messages via the Telegram Bot API,
//! dispatches them to the chat adapter, and replies back to the chat.
//!
//! Photos (own or quoted) are passed to the adapter as Telegram file ids and
//! downloaded through [`TelegramMedia`] only when an image prompt is sent.

use std::env;
use std::sync::{Arc, Mutex};

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, PhotoSize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::{
    AdapterError, ChatAdapter, ChatRequest, ImageAttachment, ImageMetadata, MessageMetadata,
    QuoteMetadata, Reply,
};
use crate::config::Config;
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::media::{MediaDownloader, MediaError, MediaRef};

use super::{Channel, ChannelFuture};

// ── Constants ────────────────────────────────────────────────────────────────

/// Telegram has a 4096 character limit per message.
/// We chunk at 4000 to be safe.
const MAX_MESSAGE_LENGTH: usize = 4000;

/// Telegram re-encodes every photo as JPEG.
const PHOTO_MIME: &str = "image/jpeg";

// ── TelegramMedia ────────────────────────────────────────────────────────────

/// Downloads photos by file id through the Bot API.
#[derive(Clone)]
pub struct TelegramMedia {
    bot: Bot,
}

impl TelegramMedia {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl MediaDownloader for TelegramMedia {
    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, MediaError> {
        let file = self
            .bot
            .get_file(FileId(media.as_str().to_owned()))
            .await
            .map_err(|e| MediaError::NotFound(format!("{}: {e}", media.as_str())))?;

        let mut bytes = Vec::new();
        self.bot
            .download_file(&file.path, &mut bytes)
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?;

        debug!(file_id = %media.as_str(), bytes = bytes.len(), "telegram photo downloaded");
        Ok(bytes)
    }
}

// ── TelegramChannel ──────────────────────────────────────────────────────────

type Adapter = ChatAdapter<LlmClient, TelegramMedia>;

pub struct TelegramChannel {
    channel_id: String,
    config: Config,
    client: LlmClient,
}

impl TelegramChannel {
    pub fn new(channel_id: impl Into<String>, config: Config, client: LlmClient) -> Self {
        Self { channel_id: channel_id.into(), config, client }
    }
}

impl Channel for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture {
        Box::pin(run_telegram(self.channel_id, self.config, self.client, shutdown))
    }
}

// ── run_telegram ─────────────────────────────────────────────────────────────

async fn run_telegram(
    channel_id: String,
    config: Config,
    client: LlmClient,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let token = match env::var("TELEGRAM_BOT_TOKEN") {
        Ok(t) => t,
        Err(_) => {
            warn!(%channel_id, "TELEGRAM_BOT_TOKEN not set, telegram channel exiting");
            return Ok(());
        }
    };

    info!(%channel_id, "telegram channel starting");

    let bot = Bot::new(token);
    let adapter: Arc<Adapter> =
        Arc::new(super::build_adapter(&config, client, TelegramMedia::new(bot.clone())));

    // Set when the model cannot be created; stops the dispatcher.
    let fatal = CancellationToken::new();
    let fatal_err: Arc<Mutex<Option<AdapterError>>> = Arc::new(Mutex::new(None));

    let handler = {
        let fatal = fatal.clone();
        let fatal_err = fatal_err.clone();
        let channel_id = channel_id.clone();

        Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
            let adapter = adapter.clone();
            let fatal = fatal.clone();
            let fatal_err = fatal_err.clone();
            let channel_id = channel_id.clone();
            async move {
                let Some(request) = to_request(&msg) else {
                    return respond(());
                };
                debug!(
                    %channel_id,
                    sender = %request.sender,
                    quoted = request.metadata.is_quoted(),
                    image = request.metadata.has_image(),
                    "telegram received message"
                );

                let mut reply = Reply::default();
                if let Err(e) = adapter.dispatch(request, |r| reply = r).await {
                    error!(%channel_id, "{e}");
                    if let Ok(mut slot) = fatal_err.lock() {
                        slot.get_or_insert(e);
                    }
                    fatal.cancel();
                    return respond(());
                }

                let text = reply.error.unwrap_or(reply.text);
                for chunk in chunk_reply(&text) {
                    if let Err(e) = bot.send_message(msg.chat.id, chunk).await {
                        warn!("failed to send telegram reply: {e}");
                    }
                }
                respond(())
            }
        })
    };

    let mut dispatcher = Dispatcher::builder(bot, handler).build();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received - closing telegram channel");
        }
        _ = fatal.cancelled() => {
            error!(%channel_id, "generative model unavailable - stopping telegram channel");
        }
        _ = dispatcher.dispatch() => {
            warn!(%channel_id, "telegram dispatcher exited unexpectedly");
        }
    }

    let fatal = fatal_err.lock().ok().and_then(|mut slot| slot.take());
    match fatal {
        Some(e) => Err(AppError::Adapter(e)),
        None => Ok(()),
    }
}

// ── message mapping ──────────────────────────────────────────────────────────

/// Map a Telegram message onto a chat request. Messages with neither text
/// nor a photo (stickers, joins, …) yield `None`.
fn to_request(msg: &Message) -> Option<ChatRequest> {
    let sender = match msg.from.as_ref() {
        Some(user) => user.id.0.to_string(),
        None => msg.chat.id.0.to_string(),
    };
    let body = msg.text().or_else(|| msg.caption());
    let photo = msg.photo().and_then(largest_photo);
    let quote = msg.reply_to_message().map(|q| QuotedMessage {
        text: q.text().or_else(|| q.caption()).unwrap_or_default().to_string(),
        photo: q.photo().and_then(largest_photo),
    });

    build_request(sender, body, photo, quote)
}

/// Telegram sends several sizes of the same photo, smallest first.
fn largest_photo(sizes: &[PhotoSize]) -> Option<String> {
    sizes.last().map(|p| p.file.id.0.clone())
}

struct QuotedMessage {
    text: String,
    photo: Option<String>,
}

fn photo_attachment(file_id: String, caption: &str) -> ImageAttachment {
    ImageAttachment::new(
        ImageMetadata::new(PHOTO_MIME).with_caption(caption),
        MediaRef::new(file_id),
    )
}

fn build_request(
    sender: String,
    body: Option<&str>,
    photo: Option<String>,
    quote: Option<QuotedMessage>,
) -> Option<ChatRequest> {
    if body.is_none() && photo.is_none() {
        return None;
    }
    let prompt = body.unwrap_or_default();

    let mut metadata = MessageMetadata::plain();
    if let Some(file_id) = photo {
        metadata = metadata.with_image(photo_attachment(file_id, prompt));
    }
    if let Some(q) = quote {
        let quoted = match q.photo {
            Some(file_id) => {
                let image = photo_attachment(file_id, &q.text);
                QuoteMetadata::image(q.text, image)
            }
            None => QuoteMetadata::text(q.text),
        };
        metadata = metadata.quoting(quoted);
    }

    Some(ChatRequest::new(sender, prompt, metadata))
}

/// Split a reply into Telegram-sized chunks on character boundaries.
fn chunk_reply(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec!["(empty response)".to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(MAX_MESSAGE_LENGTH).map(|c| c.iter().collect()).collect()
}
