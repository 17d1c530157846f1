//! Google Gemini provider (`models/{model}:generateContent`).
//!
//! All Gemini wire types are private to this module. A [`GeminiModel`] holds
//! the system instruction fixed at construction time; a [`GeminiSession`]
//! adds conversation history on top of it and replays it on every turn.
//! Image prompts go through [`GeminiModel::generate_content`], which is
//! stateless.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use crate::llm::{ModelConfig, Part, ProviderError};

/// Finish reasons for which the API withholds the candidate text.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "LANGUAGE"];

// ── Public provider ───────────────────────────────────────────────────────────

/// Entry point to the Gemini REST API. Cheap to clone: `reqwest::Client`
/// is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base_url: String,
    api_key: ApiKey,
}

impl GeminiProvider {
    /// `timeout_seconds = None` leaves requests unbounded.
    pub fn new(
        api_base_url: String,
        timeout_seconds: Option<u64>,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key: ApiKey(api_key),
        })
    }

    pub fn create_model(&self, config: &ModelConfig) -> GeminiModel {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            self.api_base_url, config.model_name
        );
        debug!(model = %config.model_name, %endpoint, "gemini model configured");
        GeminiModel {
            inner: Arc::new(ModelInner {
                client: self.client.clone(),
                endpoint,
                api_key: self.api_key.clone(),
                system_instruction: config
                    .system_instruction
                    .as_deref()
                    .map(|text| Content::new("system", vec![WirePart::text(text)])),
            }),
        }
    }
}

/// A configured model. Sessions started from it share its client and
/// system instruction.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    inner: Arc<ModelInner>,
}

impl GeminiModel {
    #[cfg(test)]
    fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn start_chat(&self) -> GeminiSession {
        GeminiSession {
            model: self.inner.clone(),
            history: Mutex::new(Vec::new()),
        }
    }

    pub async fn generate_content(&self, parts: &[Part]) -> Result<String, ProviderError> {
        let contents = [Content::new("user", parts.iter().map(WirePart::from).collect())];
        self.inner.generate(&contents).await
    }
}

/// Multi-turn conversation. History only grows on successful turns that
/// produced text; the API rejects empty `text` parts on replay.
#[derive(Debug)]
pub struct GeminiSession {
    model: Arc<ModelInner>,
    history: Mutex<Vec<Content>>,
}

impl GeminiSession {
    pub async fn send_message(&self, prompt: &str) -> Result<String, ProviderError> {
        let user_turn = Content::new("user", vec![WirePart::text(prompt)]);
        let mut contents = self.history.lock().await.clone();
        contents.push(user_turn.clone());

        let reply = self.model.generate(&contents).await?;
        if reply.is_empty() {
            warn!(endpoint = %self.model.endpoint, "empty gemini reply, turn not kept in history");
            return Ok(reply);
        }

        let mut history = self.history.lock().await;
        history.push(user_turn);
        history.push(Content::new("model", vec![WirePart::text(&reply)]));
        Ok(reply)
    }

    #[cfg(test)]
    async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

// ── Request plumbing ──────────────────────────────────────────────────────────

#[derive(Clone)]
struct ApiKey(String);

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug)]
struct ModelInner {
    client: Client,
    endpoint: String,
    api_key: ApiKey,
    system_instruction: Option<Content>,
}

impl ModelInner {
    async fn generate(&self, contents: &[Content]) -> Result<String, ProviderError> {
        let payload = GenerateContentRequest {
            system_instruction: self.system_instruction.as_ref(),
            contents,
        };

        debug!(endpoint = %self.endpoint, turns = contents.len(), "sending gemini request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full gemini request payload");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key.0)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(endpoint = %self.endpoint, error = %e, "gemini HTTP request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<GenerateContentResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize gemini response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(candidates = parsed.candidates.len(), "received gemini response");
        parsed.into_text()
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a Content>,
    contents: &'a [Content],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl Content {
    fn new(role: &str, parts: Vec<WirePart>) -> Self {
        Self { role: role.to_string(), parts }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl WirePart {
    fn text(text: &str) -> Self {
        Self { text: Some(text.to_string()), inline_data: None }
    }
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(t) => WirePart::text(t),
            Part::InlineData { mime_type, data } => WirePart {
                text: None,
                inline_data: Some(InlineData { mime_type: mime_type.clone(), data: data.clone() }),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, all text parts concatenated.
    fn into_text(self) -> Result<String, ProviderError> {
        if self.candidates.len() > 1 {
            warn!(count = self.candidates.len(), "multiple candidates returned, using the first");
        }
        let Some(candidate) = self.candidates.into_iter().next() else {
            if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ProviderError::Blocked(format!("prompt blocked ({reason})")));
            }
            return Ok(String::new());
        };

        if let Some(reason) = candidate
            .finish_reason
            .filter(|r| BLOCKING_FINISH_REASONS.contains(&r.as_str()))
        {
            return Err(ProviderError::Blocked(format!("candidate finished with {reason}")));
        }

        Ok(candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default())
    }
}

// Error envelope used by Google APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = error_message(status, &body);
    error!(%status, %message, "gemini request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => {
            let tag = env.error.status.map(|s| format!(" [{s}]")).unwrap_or_default();
            format!("HTTP {status}{tag}: {}", env.error.message)
        }
        Err(_) => format!("HTTP {status}: {body}"),
    }
}
