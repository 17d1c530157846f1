//! Media collaborator: turns an opaque message reference into raw bytes.
//!
//! Channels know how their platform stores attachments; the adapter only
//! holds a [`MediaRef`] and asks a [`MediaDownloader`] for the bytes when an
//! image prompt is actually sent. Nothing is cached.

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media not found: {0}")]
    NotFound(String),
    #[error("media download failed: {0}")]
    Download(String),
}

/// Opaque reference to an attachment, meaningful only to the channel that
/// produced it (a Telegram file id, a local path, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait MediaDownloader: Send + Sync {
    fn download(
        &self,
        media: &MediaRef,
    ) -> impl Future<Output = Result<Vec<u8>, MediaError>> + Send;
}

// ── FsMedia ──────────────────────────────────────────────────────────────────

/// Resolves references as file paths, relative ones against `root`.
/// Backs the console channel's `/image` command.
#[derive(Debug, Clone)]
pub struct FsMedia {
    root: PathBuf,
}

impl FsMedia {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, media: &MediaRef) -> PathBuf {
        let path = Path::new(media.as_str());
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }
}

impl MediaDownloader for FsMedia {
    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, MediaError> {
        let path = self.resolve(media);
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::NotFound(path.display().to_string()),
            _ => MediaError::Download(format!("{}: {e}", path.display())),
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "media read from disk");
        Ok(bytes)
    }
}

/// Best-effort MIME type from a file extension.
///
/// Unknown extensions map to `application/octet-stream`; the adapter's
/// allow-list decides what is actually accepted.
pub fn guess_mime(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
