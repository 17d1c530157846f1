//! Application-wide error types.
//!
//! Seam-specific errors ([`ProviderError`], [`MediaError`](crate::media::MediaError),
//! [`CompletionError`](crate::chat::CompletionError)) live next to the code
//! that raises them; `AppError` is what startup and the channel runtime return.

use thiserror::Error;

use crate::chat::AdapterError;
use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("argument error: {0}")]
    Cli(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(!e.to_string().is_empty());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn comms_error_display() {
        let e = AppError::Comms("channel closed".into());
        assert_eq!(e.to_string(), "comms error: channel closed");
    }

    #[test]
    fn logger_error_display() {
        let e = AppError::Logger("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
    }

    #[test]
    fn provider_error_converts() {
        let e: AppError = ProviderError::UnknownProvider("claude".into()).into();
        assert!(e.to_string().starts_with("provider error"));
        assert!(e.to_string().contains("claude"));
    }

    #[test]
    fn adapter_error_converts() {
        let inner = ProviderError::MissingApiKey("gemini".into());
        let e: AppError = AdapterError::ModelUnavailable(inner).into();
        assert!(e.to_string().contains("unable to initialize generative model"));
    }

    #[test]
    fn cli_error_display() {
        let e = AppError::Cli("unknown argument '-x'".into());
        assert_eq!(e.to_string(), "argument error: unknown argument '-x'");
        let _: &dyn Error = &e;
    }
}
