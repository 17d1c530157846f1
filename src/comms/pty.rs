//! PTY (console) channel: reads lines from stdin, dispatches them to the
//! chat adapter, prints the reply to stdout.
//!
//! Besides plain text it understands a few commands so every completion path
//! can be driven from a terminal:
//!
//! ```text
//! /image <path> [prompt]          image prompt from a local file
//! /quote <quoted text> | <prompt> reply to an earlier text message
//! /quote-image <path> | <prompt>  reply to an earlier image
//! ```
//!
//! Runs until the `shutdown` token is cancelled (Ctrl-C) or stdin is closed.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{
    ChatAdapter, ChatRequest, ImageAttachment, ImageMetadata, MessageMetadata, QuoteMetadata, Reply,
};
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::media::{FsMedia, MediaRef, guess_mime};

use super::{Channel, ChannelFuture};

/// Sender id for everything typed at the console.
const CONSOLE_SENDER: &str = "console";

const USAGE: &str = "usage: /image <path> [prompt] | /quote <text> | <prompt> | /quote-image <path> | <prompt>";

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    adapter: Arc<ChatAdapter<LlmClient, FsMedia>>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, adapter: ChatAdapter<LlmClient, FsMedia>) -> Self {
        Self { channel_id: channel_id.into(), adapter: Arc::new(adapter) }
    }
}

impl Channel for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture {
        Box::pin(run_pty(self.channel_id, self.adapter, shutdown))
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(
    channel_id: String,
    adapter: Arc<ChatAdapter<LlmClient, FsMedia>>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started - type a message and press Enter. Ctrl-C to quit.");
    println!("─────────────────────────────────");
    println!(" gemini-bridge console  (Ctrl-C to quit)");
    println!(" {USAGE}");
    println!("─────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received - closing console channel");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim();
                        if input.is_empty() { continue; }

                        debug!(input = %input, "pty received line");

                        let request = match parse_input(CONSOLE_SENDER, input) {
                            Ok(r) => r,
                            Err(usage) => {
                                println!("{usage}");
                                continue;
                            }
                        };

                        let mut reply = Reply::default();
                        adapter.dispatch(request, |r| reply = r).await?;
                        println!("{}", render(&reply));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Text to print for a reply: the error string when there is one.
fn render(reply: &Reply) -> &str {
    reply.error.as_deref().unwrap_or(&reply.text)
}

/// Turn one console line into a request. `Err` carries the usage text.
fn parse_input(sender: &str, line: &str) -> Result<ChatRequest, &'static str> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(ChatRequest::new(sender, line, MessageMetadata::plain()));
    };

    let (command, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();

    match command {
        "image" => {
            let (path, prompt) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
            if path.is_empty() {
                return Err(USAGE);
            }
            let meta = MessageMetadata::plain().with_image(local_image(path));
            Ok(ChatRequest::new(sender, prompt.trim(), meta))
        }
        "quote" => {
            let (quoted, prompt) = split_quote(args)?;
            let meta = MessageMetadata::plain().quoting(QuoteMetadata::text(quoted));
            Ok(ChatRequest::new(sender, prompt, meta))
        }
        "quote-image" => {
            let (path, prompt) = split_quote(args)?;
            let meta = MessageMetadata::plain().quoting(QuoteMetadata::image("", local_image(path)));
            Ok(ChatRequest::new(sender, prompt, meta))
        }
        _ => Err(USAGE),
    }
}

fn split_quote(args: &str) -> Result<(&str, &str), &'static str> {
    match args.split_once('|') {
        Some((quoted, prompt)) if !quoted.trim().is_empty() => Ok((quoted.trim(), prompt.trim())),
        _ => Err(USAGE),
    }
}

fn local_image(path: &str) -> ImageAttachment {
    ImageAttachment::new(
        ImageMetadata::new(guess_mime(path)).with_url(path),
        MediaRef::new(path),
    )
}
