//! Dummy LLM provider: echoes input back prefixed with `[echo]`.
//! Used for running the bridge without an API key and in tests.

use tokio::sync::Mutex;
use tracing::debug;

use crate::llm::{ModelConfig, Part, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub fn create_model(&self, config: &ModelConfig) -> DummyModel {
        DummyModel { model_name: config.model_name.clone() }
    }
}

#[derive(Debug, Clone)]
pub struct DummyModel {
    model_name: String,
}

impl DummyModel {
    #[cfg(test)]
    fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn start_chat(&self) -> DummySession {
        debug!(model = %self.model_name, "dummy chat started");
        DummySession { history: Mutex::new(Vec::new()) }
    }

    /// Echo text parts joined by a space; inline parts are summarised.
    pub async fn generate_content(&self, parts: &[Part]) -> Result<String, ProviderError> {
        let mut text = Vec::new();
        let mut images = String::new();
        for part in parts {
            match part {
                Part::Text(t) => text.push(t.as_str()),
                Part::InlineData { mime_type, data } => {
                    let bytes = (data.len() / 4 * 3).saturating_sub(data.matches('=').count());
                    images.push_str(&format!(" [{mime_type} image, {bytes} bytes]"));
                }
            }
        }
        Ok(format!("[echo] {}{images}", text.join(" ")))
    }
}

#[derive(Debug)]
pub struct DummySession {
    /// Prompts received so far, oldest first.
    history: Mutex<Vec<String>>,
}

impl DummySession {
    pub async fn send_message(&self, prompt: &str) -> Result<String, ProviderError> {
        let turn = {
            let mut history = self.history.lock().await;
            history.push(prompt.to_string());
            history.len()
        };
        debug!(turn, "dummy echo");
        Ok(format!("[echo] {prompt}"))
    }

    #[cfg(test)]
    async fn turns(&self) -> usize {
        self.history.lock().await.len()
    }
}
