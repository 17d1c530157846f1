//! Generative-AI client abstraction.
//!
//! The adapter talks to a model through three small traits that mirror the
//! remote API's shape:
//!
//! ```text
//! ModelFactory ──create_model──▶ GenerativeModel ──start_chat──▶ ChatSession
//!                                      │                              │
//!                               generate_content               send_message
//!                               (stateless, parts)             (history kept)
//! ```
//!
//! Production code uses [`LlmClient`], an enum over concrete providers; tests
//! plug fakes into the traits directly. Adding a backend = new module in
//! `providers/` + a variant on each of the three enums.

pub mod providers;

use std::future::Future;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key for provider '{0}'")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("response blocked: {0}")]
    Blocked(String),
}

// ── Request types ─────────────────────────────────────────────────────────────

/// Settings fixed at model construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub model_name: String,
    pub system_instruction: Option<String>,
}

/// One piece of a multi-part `generate_content` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// `data` is base64 (standard alphabet, padded).
    InlineData { mime_type: String, data: String },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    /// Encode raw bytes as an inline-data part tagged with `mime_type`.
    pub fn inline_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Part::InlineData {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }
}

// ── Client contract ───────────────────────────────────────────────────────────

/// Builds model handles. Construction is local; no network round-trip.
pub trait ModelFactory: Send + Sync {
    type Model: GenerativeModel;

    fn create_model(&self, config: &ModelConfig) -> Result<Self::Model, ProviderError>;
}

/// A configured remote model, shared by every user of the adapter.
pub trait GenerativeModel: Send + Sync + 'static {
    type Session: ChatSession;

    /// Open a new multi-turn conversation with empty history.
    fn start_chat(&self) -> Self::Session;

    /// Single-turn, stateless generation from a list of parts.
    fn generate_content(
        &self,
        parts: Vec<Part>,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// A multi-turn conversation. Implementations keep their own history.
pub trait ChatSession: Send + Sync + 'static {
    fn send_message(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

// ── Provider enums ────────────────────────────────────────────────────────────

/// All available provider backends. Cheap to clone.
#[derive(Debug, Clone)]
pub enum LlmClient {
    Dummy(providers::dummy::DummyProvider),
    Gemini(providers::gemini::GeminiProvider),
}

/// Model handle produced by [`LlmClient`].
#[derive(Debug, Clone)]
pub enum LlmModel {
    Dummy(providers::dummy::DummyModel),
    Gemini(providers::gemini::GeminiModel),
}

/// Chat session produced by [`LlmModel`].
#[derive(Debug)]
pub enum LlmSession {
    Dummy(providers::dummy::DummySession),
    Gemini(providers::gemini::GeminiSession),
}

impl LlmClient {
    pub fn name(&self) -> &'static str {
        match self {
            LlmClient::Dummy(_) => "dummy",
            LlmClient::Gemini(_) => "gemini",
        }
    }
}

impl ModelFactory for LlmClient {
    type Model = LlmModel;

    fn create_model(&self, config: &ModelConfig) -> Result<LlmModel, ProviderError> {
        match self {
            LlmClient::Dummy(p) => Ok(LlmModel::Dummy(p.create_model(config))),
            LlmClient::Gemini(p) => Ok(LlmModel::Gemini(p.create_model(config))),
        }
    }
}

impl GenerativeModel for LlmModel {
    type Session = LlmSession;

    fn start_chat(&self) -> LlmSession {
        match self {
            LlmModel::Dummy(m) => LlmSession::Dummy(m.start_chat()),
            LlmModel::Gemini(m) => LlmSession::Gemini(m.start_chat()),
        }
    }

    async fn generate_content(&self, parts: Vec<Part>) -> Result<String, ProviderError> {
        match self {
            LlmModel::Dummy(m) => m.generate_content(&parts).await,
            LlmModel::Gemini(m) => m.generate_content(&parts).await,
        }
    }
}

impl ChatSession for LlmSession {
    async fn send_message(&self, prompt: &str) -> Result<String, ProviderError> {
        match self {
            LlmSession::Dummy(s) => s.send_message(prompt).await,
            LlmSession::Gemini(s) => s.send_message(prompt).await,
        }
    }
}
