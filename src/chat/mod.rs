//! Conversational completion adapter.
//!
//! [`ChatAdapter`] sits between a messaging channel and a generative model:
//!
//! ```text
//! channel ──ChatRequest──▶ dispatch ─┬─ Route::Text / QuotedText ──▶ complete_text  (per-user session)
//!                                    └─ Route::Image / QuotedImage ─▶ complete_image (single turn)
//!         ◀──────Reply────────────── icon prefix + text, or error label + cause
//! ```
//!
//! The model is created lazily on first use and shared by every user.
//! Failures are typed: an unsupported image is a [`Completion::Rejected`]
//! outcome, a remote failure is a [`CompletionError`], and only `dispatch`
//! turns either into the reply contract. A model that cannot be created is
//! an [`AdapterError`] and aborts the dispatch instead.

pub mod metadata;
pub mod prompt;
pub mod sessions;

pub use metadata::{
    ChatRequest, ImageAttachment, ImageMetadata, MessageMetadata, QuoteMetadata, Reply,
};
pub use prompt::Route;
pub use sessions::{SessionPolicy, SessionRegistry};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::llm::{ChatSession, GenerativeModel, ModelConfig, ModelFactory, Part, ProviderError};
use crate::media::{MediaDownloader, MediaError, MediaRef};

// ── Errors & outcomes ────────────────────────────────────────────────────────

/// The model handle could not be created. Not reported through the reply
/// callback; the caller's configuration is broken.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unable to initialize generative model: {0}")]
    ModelUnavailable(#[source] ProviderError),
}

/// Failure of a single completion. Rendered into the reply's error string.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Model(#[from] AdapterError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnsupportedImageType(String),
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::UnsupportedImageType(_) => prompt::INVALID_IMAGE_REPLY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Rejected(Rejection),
}

impl Completion {
    /// Text shown to the user: the model's reply or the rejection notice.
    pub fn into_text(self) -> String {
        match self {
            Completion::Text(text) => text,
            Completion::Rejected(r) => r.message().to_string(),
        }
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSettings {
    pub model_name: String,
    /// Prepended to every successful reply.
    pub icon_prefix: String,
    /// System instruction for the model.
    pub persona: String,
}

impl AdapterSettings {
    pub fn new(model_name: impl Into<String>, icon_prefix: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            icon_prefix: icon_prefix.into(),
            persona: prompt::PERSONA_INSTRUCTION.to_string(),
        }
    }
}

// ── Adapter ──────────────────────────────────────────────────────────────────

type SessionOf<F> = <<F as ModelFactory>::Model as GenerativeModel>::Session;

pub struct ChatAdapter<F: ModelFactory, D> {
    factory: F,
    media: D,
    settings: AdapterSettings,
    model: OnceCell<F::Model>,
    sessions: SessionRegistry<SessionOf<F>>,
}

impl<F, D> ChatAdapter<F, D>
where
    F: ModelFactory,
    D: MediaDownloader,
{
    pub fn new(
        factory: F,
        media: D,
        sessions: SessionRegistry<SessionOf<F>>,
        settings: AdapterSettings,
    ) -> Self {
        Self { factory, media, settings, model: OnceCell::new(), sessions }
    }

    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionRegistry<SessionOf<F>> {
        &self.sessions
    }

    /// `true` once the model handle exists.
    pub fn ready(&self) -> bool {
        self.model.initialized()
    }

    /// Create the model on first call; later and concurrent calls share it.
    pub async fn ensure_model_ready(&self) -> Result<&F::Model, AdapterError> {
        self.model
            .get_or_try_init(|| async {
                let config = ModelConfig {
                    model_name: self.settings.model_name.clone(),
                    system_instruction: Some(self.settings.persona.clone()),
                };
                match self.factory.create_model(&config) {
                    Ok(model) => {
                        info!(model = %config.model_name, "generative model initialized");
                        Ok(model)
                    }
                    Err(e) => {
                        error!(model = %config.model_name, error = %e, "generative model unavailable");
                        Err(AdapterError::ModelUnavailable(e))
                    }
                }
            })
            .await
    }

    pub async fn get_or_create_session(
        &self,
        user: &str,
    ) -> Result<Arc<SessionOf<F>>, AdapterError> {
        let model = self.ensure_model_ready().await?;
        Ok(self.sessions.get_or_create(user, || model.start_chat()).await)
    }

    /// Send `prompt` through `user`'s session and return the reply text.
    pub async fn complete_text(&self, user: &str, prompt: &str) -> Result<String, CompletionError> {
        let _lane = self.sessions.lane(user).await;
        let session = self.get_or_create_session(user).await?;
        debug!(%user, prompt_len = prompt.len(), "sending chat message");
        Ok(session.send_message(prompt).await?)
    }

    /// Single-turn prompt with an image. Unsupported MIME types are rejected
    /// before anything is downloaded or sent.
    pub async fn complete_image(
        &self,
        prompt: &str,
        image: &ImageMetadata,
        media: &MediaRef,
    ) -> Result<Completion, CompletionError> {
        if !prompt::is_allowed_image_type(&image.mime_type) {
            info!(mime_type = %image.mime_type, "rejecting unsupported image type");
            return Ok(Completion::Rejected(Rejection::UnsupportedImageType(
                image.mime_type.clone(),
            )));
        }

        let model = self.ensure_model_ready().await?;
        let bytes = self.media.download(media).await?;
        debug!(mime_type = %image.mime_type, bytes = bytes.len(), "sending image prompt");

        let parts = vec![Part::text(prompt), Part::inline_bytes(&bytes, image.mime_type.as_str())];
        Ok(Completion::Text(model.generate_content(parts).await?))
    }

    /// Top-level entry point. `reply` is called exactly once unless the model
    /// cannot be created, in which case the error is returned instead.
    pub async fn dispatch<R>(&self, request: ChatRequest, reply: R) -> Result<(), AdapterError>
    where
        R: FnOnce(Reply),
    {
        self.ensure_model_ready().await?;

        let ChatRequest { sender, prompt, metadata } = request;
        match self.respond(&sender, &prompt, &metadata).await {
            Ok(completion) => {
                let text = format!("{}{}", self.settings.icon_prefix, completion.into_text());
                reply(Reply::ok(text));
            }
            Err(e) => {
                warn!(%sender, error = %e, "completion failed");
                reply(Reply::failed(format!("{}{e}", prompt::ERROR_LABEL)));
            }
        }
        Ok(())
    }

    async fn respond(
        &self,
        sender: &str,
        prompt: &str,
        metadata: &MessageMetadata,
    ) -> Result<Completion, CompletionError> {
        let prompt = prompt::build_prompt(prompt, metadata);
        let route = prompt::route(metadata);
        debug!(%sender, ?route, "routing message");

        match route {
            Route::QuotedImage(image) | Route::Image(image) => {
                self.complete_image(&prompt, &image.meta, &image.media).await
            }
            Route::QuotedText | Route::Text => {
                self.complete_text(sender, &prompt).await.map(Completion::Text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::chat::prompt::{ERROR_LABEL, PERSONA_FLAIR, PERSONA_INSTRUCTION};

    // ── fakes ────────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Calls {
        models: AtomicUsize,
        sessions: AtomicUsize,
        generates: AtomicUsize,
        downloads: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        prompts: Mutex<Vec<String>>,
        parts: Mutex<Vec<Vec<Part>>>,
        system: Mutex<Option<String>>,
    }

    #[derive(Clone, Copy, Default)]
    struct Faults {
        model: bool,
        send: bool,
        download: bool,
    }

    struct FakeFactory {
        calls: Arc<Calls>,
        faults: Faults,
    }

    struct FakeModel {
        calls: Arc<Calls>,
        faults: Faults,
    }

    struct FakeSession {
        calls: Arc<Calls>,
        fail: bool,
    }

    struct FakeMedia {
        calls: Arc<Calls>,
        fail: bool,
    }

    impl ModelFactory for FakeFactory {
        type Model = FakeModel;

        fn create_model(&self, config: &ModelConfig) -> Result<FakeModel, ProviderError> {
            self.calls.models.fetch_add(1, Ordering::SeqCst);
            *self.calls.system.lock().unwrap() = config.system_instruction.clone();
            if self.faults.model {
                return Err(ProviderError::MissingApiKey("fake".into()));
            }
            Ok(FakeModel { calls: self.calls.clone(), faults: self.faults })
        }
    }

    impl GenerativeModel for FakeModel {
        type Session = FakeSession;

        fn start_chat(&self) -> FakeSession {
            self.calls.sessions.fetch_add(1, Ordering::SeqCst);
            FakeSession { calls: self.calls.clone(), fail: self.faults.send }
        }

        async fn generate_content(&self, parts: Vec<Part>) -> Result<String, ProviderError> {
            self.calls.generates.fetch_add(1, Ordering::SeqCst);
            self.calls.parts.lock().unwrap().push(parts);
            Ok("nice pic".into())
        }
    }

    impl ChatSession for FakeSession {
        async fn send_message(&self, prompt: &str) -> Result<String, ProviderError> {
            let now = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.calls.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Request("network down".into()));
            }
            Ok("hey bestie".into())
        }
    }

    impl MediaDownloader for FakeMedia {
        async fn download(&self, _media: &MediaRef) -> Result<Vec<u8>, MediaError> {
            self.calls.downloads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MediaError::Download("expired".into()));
            }
            Ok(b"img".to_vec())
        }
    }

    type Adapter = ChatAdapter<FakeFactory, FakeMedia>;

    fn adapter_with(faults: Faults, policy: SessionPolicy) -> (Adapter, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let adapter = ChatAdapter::new(
            FakeFactory { calls: calls.clone(), faults },
            FakeMedia { calls: calls.clone(), fail: faults.download },
            SessionRegistry::new(policy),
            AdapterSettings::new("fake-model", "🤖 "),
        );
        (adapter, calls)
    }

    fn adapter() -> (Adapter, Arc<Calls>) {
        adapter_with(Faults::default(), SessionPolicy::default())
    }

    fn attachment(mime: &str) -> ImageAttachment {
        ImageAttachment::new(ImageMetadata::new(mime), MediaRef::new("msg-1"))
    }

    async fn dispatch(adapter: &Adapter, request: ChatRequest) -> Reply {
        let mut out = None;
        adapter.dispatch(request, |r| out = Some(r)).await.unwrap();
        out.expect("reply callback not invoked")
    }

    // ── model lifecycle ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn model_is_created_once() {
        let (adapter, calls) = adapter();
        assert!(!adapter.ready());

        adapter.ensure_model_ready().await.unwrap();
        adapter.ensure_model_ready().await.unwrap();

        assert!(adapter.ready());
        assert_eq!(calls.models.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_init_creates_one_model() {
        let (adapter, calls) = adapter();
        let (a, b) = tokio::join!(adapter.ensure_model_ready(), adapter.ensure_model_ready());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.models.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_gets_persona_instruction() {
        let (adapter, calls) = adapter();
        adapter.ensure_model_ready().await.unwrap();
        assert_eq!(calls.system.lock().unwrap().as_deref(), Some(PERSONA_INSTRUCTION));
    }

    #[tokio::test]
    async fn model_failure_aborts_dispatch_without_reply() {
        let (adapter, _) = adapter_with(Faults { model: true, ..Faults::default() }, SessionPolicy::default());
        let mut called = false;
        let result = adapter
            .dispatch(ChatRequest::new("alice", "hi", MessageMetadata::plain()), |_| called = true)
            .await;

        assert!(matches!(result, Err(AdapterError::ModelUnavailable(_))));
        assert!(!called);
        assert!(!adapter.ready());
    }

    // ── sessions ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn session_is_reference_stable() {
        let (adapter, calls) = adapter();
        let first = adapter.get_or_create_session("alice").await.unwrap();
        let second = adapter.get_or_create_session("alice").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.sessions.load(Ordering::SeqCst), 1);

        adapter.get_or_create_session("bob").await.unwrap();
        assert_eq!(calls.sessions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_messages_share_one_session() {
        let (adapter, calls) = adapter();
        let (a, b) = tokio::join!(
            adapter.complete_text("alice", "one"),
            adapter.complete_text("alice", "two"),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.sessions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unserialized_sends_may_overlap() {
        let (adapter, calls) = adapter();
        let _ = tokio::join!(
            adapter.complete_text("alice", "one"),
            adapter.complete_text("alice", "two"),
        );
        assert_eq!(calls.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn serialized_sends_do_not_overlap() {
        let (adapter, calls) = adapter_with(Faults::default(), SessionPolicy { serialize_per_sender: true });
        let _ = tokio::join!(
            adapter.complete_text("alice", "one"),
            adapter.complete_text("alice", "two"),
        );
        assert_eq!(calls.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*calls.prompts.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
    }

    // ── image path ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_mime_is_rejected_without_calls() {
        let (adapter, calls) = adapter();
        let completion = adapter
            .complete_image("p", &ImageMetadata::new("image/gif"), &MediaRef::new("m"))
            .await
            .unwrap();

        assert_eq!(
            completion,
            Completion::Rejected(Rejection::UnsupportedImageType("image/gif".into()))
        );
        assert_eq!(completion.into_text(), "The image is not a valid image type.");
        assert_eq!(calls.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(calls.generates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn image_completion_sends_prompt_and_inline_part() {
        let (adapter, calls) = adapter();
        let completion = adapter
            .complete_image("describe", &ImageMetadata::new("image/webp"), &MediaRef::new("m"))
            .await
            .unwrap();

        assert_eq!(completion, Completion::Text("nice pic".into()));
        let parts = calls.parts.lock().unwrap();
        assert_eq!(
            parts[0],
            vec![
                Part::Text("describe".into()),
                Part::InlineData { mime_type: "image/webp".into(), data: "aW1n".into() },
            ]
        );
        assert_eq!(calls.sessions.load(Ordering::SeqCst), 0);
    }

    // ── dispatch ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_text_goes_through_sender_session() {
        let (adapter, calls) = adapter();
        let reply = dispatch(&adapter, ChatRequest::new("alice", "sup", MessageMetadata::plain())).await;

        assert_eq!(reply, Reply::ok("🤖 hey bestie"));
        assert!(adapter.sessions().contains("alice").await);
        assert_eq!(*calls.prompts.lock().unwrap(), vec![format!("{PERSONA_FLAIR}sup")]);
    }

    #[tokio::test]
    async fn quoted_text_prompt_is_wrapped() {
        let (adapter, calls) = adapter();
        let meta = MessageMetadata::plain().quoting(QuoteMetadata::text("old news"));
        dispatch(&adapter, ChatRequest::new("alice", "P", meta)).await;

        assert_eq!(
            calls.prompts.lock().unwrap()[0],
            "Talk like a GenZ internet buddy, chill vibes only 😎:\n\
             Quoted Message:\nold news\n---\nMessage:\nP"
        );
    }

    #[tokio::test]
    async fn own_image_uses_image_path() {
        let (adapter, calls) = adapter();
        let meta = MessageMetadata::plain().with_image(attachment("image/jpeg"));
        let reply = dispatch(&adapter, ChatRequest::new("alice", "rate this", meta)).await;

        assert_eq!(reply, Reply::ok("🤖 nice pic"));
        assert_eq!(calls.downloads.load(Ordering::SeqCst), 1);
        assert!(adapter.sessions().is_empty().await);
        assert_eq!(
            calls.parts.lock().unwrap()[0][0],
            Part::Text(format!("{PERSONA_FLAIR}rate this"))
        );
    }

    #[tokio::test]
    async fn quoted_image_uses_quoted_attachment() {
        let (adapter, calls) = adapter();
        let meta = MessageMetadata::plain().quoting(QuoteMetadata::image("cap", attachment("image/png")));
        let reply = dispatch(&adapter, ChatRequest::new("alice", "what is it", meta)).await;

        assert_eq!(reply, Reply::ok("🤖 nice pic"));
        assert_eq!(calls.generates.load(Ordering::SeqCst), 1);
        assert_eq!(calls.sessions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_image_reply_keeps_icon_prefix() {
        let (adapter, _) = adapter();
        let meta = MessageMetadata::plain().with_image(attachment("image/gif"));
        let reply = dispatch(&adapter, ChatRequest::new("alice", "lol", meta)).await;
        assert_eq!(reply, Reply::ok("🤖 The image is not a valid image type."));
    }

    #[tokio::test]
    async fn send_failure_becomes_error_reply() {
        let (adapter, _) = adapter_with(Faults { send: true, ..Faults::default() }, SessionPolicy::default());
        let reply = dispatch(&adapter, ChatRequest::new("alice", "hi", MessageMetadata::plain())).await;

        assert_eq!(reply.text, "");
        let error = reply.error.unwrap();
        assert!(error.starts_with("[Error] An error occurred. Check the console for details.\n[Message]: "));
        assert_eq!(error, format!("{ERROR_LABEL}provider request failed: network down"));
    }

    #[tokio::test]
    async fn download_failure_becomes_error_reply() {
        let (adapter, _) = adapter_with(Faults { download: true, ..Faults::default() }, SessionPolicy::default());
        let meta = MessageMetadata::plain().with_image(attachment("image/png"));
        let reply = dispatch(&adapter, ChatRequest::new("alice", "hi", meta)).await;

        assert_eq!(reply.error.as_deref(), Some(&*format!("{ERROR_LABEL}media download failed: expired")));
    }
}
