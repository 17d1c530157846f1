//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called once at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod gemini;

use crate::config::LlmConfig;
use crate::llm::{LlmClient, ProviderError};

/// Construct an [`LlmClient`] from config and an optional API key.
///
/// `api_key` is sourced from `API_KEY_GEMINI` env (never TOML). The dummy
/// provider ignores it; Gemini refuses to start without one.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmClient, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmClient::Dummy(dummy::DummyProvider)),
        "gemini" => {
            let api_key = api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| ProviderError::MissingApiKey("gemini".into()))?;
            let g = &config.gemini;
            let p = gemini::GeminiProvider::new(g.api_base_url.clone(), g.timeout_seconds, api_key)?;
            Ok(LlmClient::Gemini(p))
        }
        _ => Err(ProviderError::UnknownProvider(config.provider.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeminiConfig;

    fn llm_config(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            gemini: GeminiConfig {
                api_base_url: "http://localhost:0/v1beta".into(),
                model: "gemini-1.5-flash".into(),
                timeout_seconds: None,
            },
        }
    }

    #[test]
    fn builds_dummy_without_key() {
        let client = build(&llm_config("dummy"), None).unwrap();
        assert_eq!(client.name(), "dummy");
    }

    #[test]
    fn builds_gemini_with_key() {
        let client = build(&llm_config("gemini"), Some("secret".into())).unwrap();
        assert_eq!(client.name(), "gemini");
    }

    #[test]
    fn gemini_requires_key() {
        let err = build(&llm_config("gemini"), None).unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(ref p) if p == "gemini"));

        let err = build(&llm_config("gemini"), Some("  ".into())).unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(_)));
    }

    #[test]
    fn unknown_provider_errors() {
        let err = build(&llm_config("openai"), None).unwrap_err();
        assert_eq!(err.to_string(), "unknown provider: openai");
    }
}
