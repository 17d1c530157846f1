//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit path from `-f`), then applies `GEMINI_BRIDGE_LOG_LEVEL` and `GEMINI_ICON_PREFIX` env
//! overrides. The Gemini API key only ever comes from `API_KEY_GEMINI`.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::chat::SessionPolicy;
use crate::error::AppError;

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
    /// Directory that relative `/image` paths are resolved against.
    pub media_dir: PathBuf,
}

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub telegram: TelegramConfig,
}

/// Gemini provider configuration (`[llm.gemini]`).
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API root up to and including the version segment.
    pub api_base_url: String,
    /// Model name, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// Per-request HTTP timeout; `None` waits indefinitely.
    pub timeout_seconds: Option<u64>,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"gemini"` or `"dummy"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub gemini: GeminiConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    /// Prepended to every successful reply.
    pub icon_prefix: String,
    pub llm: LlmConfig,
    pub sessions: SessionPolicy,
    pub comms: CommsConfig,
    /// API key from `API_KEY_GEMINI` env var. Never sourced from TOML.
    pub llm_api_key: Option<String>,
}

impl Config {
    /// Model name handed to the adapter for the active provider.
    pub fn model_name(&self) -> &str {
        &self.llm.gemini.model
    }

    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_telegram_should_load(&self) -> bool {
        self.comms.telegram.enabled
    }
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    bot: RawBot,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    sessions: RawSessions,
    #[serde(default)]
    comms: RawComms,
}

#[derive(Deserialize)]
struct RawBot {
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    icon_prefix: String,
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    gemini: RawGemini,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), gemini: RawGemini::default() }
    }
}

#[derive(Deserialize)]
struct RawGemini {
    #[serde(default = "default_gemini_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_gemini_model")]
    model: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl Default for RawGemini {
    fn default() -> Self {
        Self {
            api_base_url: default_gemini_api_base_url(),
            model: default_gemini_model(),
            timeout_seconds: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct RawSessions {
    #[serde(default)]
    serialize_per_sender: bool,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    telegram: RawTelegram,
}

#[derive(Deserialize)]
struct RawPty {
    /// Defaults to `true`: the console is the out-of-the-box channel.
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_media_dir")]
    media_dir: String,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true, media_dir: default_media_dir() }
    }
}

#[derive(Deserialize, Default)]
struct RawTelegram {
    /// Telegram must be explicitly enabled.
    #[serde(default)]
    enabled: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_llm_provider() -> String { "gemini".to_string() }
fn default_gemini_api_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_gemini_model() -> String { "gemini-1.5-flash".to_string() }
fn default_media_dir() -> String { ".".to_string() }
fn default_true() -> bool { true }

/// Env-sourced values, gathered in one place so tests can pass them directly.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    pub icon_prefix: Option<String>,
    pub api_key: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("GEMINI_BRIDGE_LOG_LEVEL").ok(),
            icon_prefix: env::var("GEMINI_ICON_PREFIX").ok(),
            api_key: env::var("API_KEY_GEMINI").ok(),
        }
    }
}

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Load config from `path` (or [`DEFAULT_CONFIG_PATH`]), then apply env-var
/// overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    load_from(Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)), Overrides::from_env())
}

/// Internal loader: accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, overrides)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))
}

fn parse(raw: &str, overrides: Overrides) -> Result<Config, toml::de::Error> {
    let parsed: RawConfig = toml::from_str(raw)?;
    let bot = parsed.bot;

    Ok(Config {
        bot_name: bot.name,
        log_level: overrides.log_level.unwrap_or(bot.log_level),
        icon_prefix: overrides.icon_prefix.unwrap_or(bot.icon_prefix),
        llm: LlmConfig {
            provider: parsed.llm.provider,
            gemini: GeminiConfig {
                api_base_url: parsed.llm.gemini.api_base_url,
                model: parsed.llm.gemini.model,
                timeout_seconds: parsed.llm.gemini.timeout_seconds,
            },
        },
        sessions: SessionPolicy {
            serialize_per_sender: parsed.sessions.serialize_per_sender,
        },
        comms: CommsConfig {
            pty: PtyConfig {
                enabled: parsed.comms.pty.enabled,
                media_dir: PathBuf::from(parsed.comms.pty.media_dir),
            },
            telegram: TelegramConfig { enabled: parsed.comms.telegram.enabled },
        },
        llm_api_key: overrides.api_key,
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: dummy LLM, no API keys, no external calls.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            icon_prefix: "🤖 ".into(),
            llm: LlmConfig {
                provider: "dummy".into(),
                gemini: GeminiConfig {
                    api_base_url: "http://localhost:0/v1beta".into(),
                    model: "test-model".into(),
                    timeout_seconds: Some(1),
                },
            },
            sessions: SessionPolicy::default(),
            comms: CommsConfig {
                pty: PtyConfig { enabled: true, media_dir: PathBuf::from(".") },
                telegram: TelegramConfig { enabled: false },
            },
            llm_api_key: None,
        }
    }
}
