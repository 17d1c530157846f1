//! Comms: the messaging channels that feed the chat adapter.
//!
//! # Channel model
//!
//! Each channel (PTY, Telegram) implements [`Channel`] and is spawned as an
//! independent task by [`spawn_channels`]. A channel owns its own
//! [`ChatAdapter`]: the adapter's media downloader is platform-specific, and
//! sender ids from different platforms never share sessions.
//!
//! Any channel error cancels the shared [`CancellationToken`] so siblings
//! and `main` shut down cleanly.

#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-telegram")]
pub mod telegram;

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chat::{AdapterSettings, ChatAdapter, SessionRegistry};
use crate::config::Config;
use crate::error::AppError;
use crate::llm::LlmClient;
use crate::media::MediaDownloader;

// ── Channel ──────────────────────────────────────────────────────────────────

/// A boxed, owned future returned by [`Channel::run`].
pub type ChannelFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A concurrently-runnable messaging channel.
///
/// Implementors capture everything they need at construction time.
/// [`Channel::run`] is called once and should return when `shutdown` is
/// cancelled or the channel's input ends.
pub trait Channel: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture;
}

// ── CommsHandle ──────────────────────────────────────────────────────────────

/// Handle to the running channel set. `.join()` waits for all of them.
pub struct CommsHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl CommsHandle {
    /// Await all channels and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Comms(format!("comms task panicked: {e}"))),
        }
    }
}

/// Spawn each channel as its own task.
///
/// If any channel returns `Err` or panics, `shutdown` is cancelled; the
/// remaining channels are drained and the first error is returned.
pub fn spawn_channels(channels: Vec<Box<dyn Channel>>, shutdown: CancellationToken) -> CommsHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for channel in channels {
            debug!(channel = %channel.id(), "spawning channel");
            set.spawn(channel.run(shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("channel panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("channel panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("channel error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    CommsHandle { inner: handle }
}

// ── start ────────────────────────────────────────────────────────────────────

/// Build one adapter for a channel from the shared config and client.
pub fn build_adapter<D: MediaDownloader>(
    config: &Config,
    client: LlmClient,
    media: D,
) -> ChatAdapter<LlmClient, D> {
    ChatAdapter::new(
        client,
        media,
        SessionRegistry::new(config.sessions),
        AdapterSettings::new(config.model_name(), config.icon_prefix.clone()),
    )
}

/// Spawn all configured channels. Returns as soon as the tasks exist.
pub fn start(config: &Config, client: LlmClient, shutdown: CancellationToken) -> CommsHandle {
    let mut channels: Vec<Box<dyn Channel>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            let media = crate::media::FsMedia::new(config.comms.pty.media_dir.clone());
            let adapter = build_adapter(config, client.clone(), media);
            channels.push(Box::new(pty::PtyChannel::new("pty0", adapter)));
        }
    }

    #[cfg(feature = "channel-telegram")]
    {
        if config.comms_telegram_should_load() {
            info!("loading telegram channel");
            channels.push(Box::new(telegram::TelegramChannel::new(
                "telegram0",
                config.clone(),
                client.clone(),
            )));
        }
    }

    if channels.is_empty() {
        info!(provider = client.name(), "no comms channels configured - waiting for shutdown");
    }

    spawn_channels(channels, shutdown)
}
