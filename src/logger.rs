//! tracing subscriber for gemini-bridge.
//!
//! Logs go to stderr: stdout carries the console channel's replies.
//!
//! Two directive sources compete, a CLI level (`-q` / `-v` / `-vv`) or the
//! configured `[bot] log_level`, against `RUST_LOG`:
//!
//! ```text
//! CLI level given   → CLI level, then RUST_LOG
//! no CLI level      → RUST_LOG, then [bot] log_level
//! ```
//!
//! The second source is only used when the first is absent or does not parse.

use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Install the global subscriber. `from_cli` marks `level` as an explicit
/// command-line choice that overrides `RUST_LOG`.
pub fn init(level: &str, from_cli: bool) -> Result<(), AppError> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = select_filter(level, from_cli, rust_log.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

fn select_filter(level: &str, from_cli: bool, rust_log: Option<&str>) -> Result<EnvFilter, AppError> {
    let order = if from_cli { [Some(level), rust_log] } else { [rust_log, Some(level)] };

    let mut rejected = Vec::new();
    for directive in order.into_iter().flatten().filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return Ok(filter),
            Err(e) => rejected.push(format!("'{directive}': {e}")),
        }
    }

    if rejected.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    Err(AppError::Logger(format!("no usable log filter ({})", rejected.join("; "))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    fn max_level(level: &str, from_cli: bool, rust_log: Option<&str>) -> Option<LevelFilter> {
        select_filter(level, from_cli, rust_log).unwrap().max_level_hint()
    }

    #[test]
    fn configured_level_used_without_rust_log() {
        assert_eq!(max_level("warn", false, None), Some(LevelFilter::WARN));
    }

    #[test]
    fn rust_log_beats_configured_level() {
        assert_eq!(max_level("info", false, Some("trace")), Some(LevelFilter::TRACE));
    }

    #[test]
    fn cli_level_beats_rust_log() {
        assert_eq!(max_level("debug", true, Some("error")), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn bad_configured_level_is_covered_by_rust_log() {
        assert_eq!(max_level("gemini_bridge=loud", false, Some("debug")), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn bad_rust_log_falls_back_to_configured_level() {
        assert_eq!(max_level("info", false, Some("gemini_bridge=loud")), Some(LevelFilter::INFO));
    }

    #[test]
    fn blank_rust_log_is_ignored() {
        assert_eq!(max_level("error", false, Some("  ")), Some(LevelFilter::ERROR));
    }

    #[test]
    fn nothing_usable_errors() {
        let err = select_filter("gemini_bridge=loud", false, None).unwrap_err();
        assert!(err.to_string().contains("no usable log filter"));
        let err = select_filter("", false, None).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn init_succeeds_or_already_init() {
        // Another test in this process may have installed it first.
        match init("info", false) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
