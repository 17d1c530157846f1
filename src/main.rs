//! gemini-bridge binary.
//!
//! Loads `.env` and the TOML config, installs logging, builds the LLM client
//! and runs the enabled chat channels until Ctrl-C or until every channel
//! has finished. The generative model itself is only created when the first
//! message arrives.

use gemini_bridge::error::AppError;
use gemini_bridge::{comms, config, llm, logger};

use tokio_util::sync::CancellationToken;
use tracing::info;

const USAGE: &str = "\
Usage: gemini-bridge [OPTIONS]

Options:
  -f, --config <PATH>   Config file (default: config/default.toml)
  -q, --quiet           Log warnings and errors only
  -v, --verbose         Debug logs: routing, session creation, request sizes
  -vv                   Trace logs: full Gemini request payloads
  -h, --help            Print this help

Environment:
  API_KEY_GEMINI            Gemini API key (required for the gemini provider)
  GEMINI_ICON_PREFIX        Overrides [bot] icon_prefix
  GEMINI_BRIDGE_LOG_LEVEL   Overrides [bot] log_level
  TELEGRAM_BOT_TOKEN        Enables the Telegram channel when compiled in";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let args = match parse_args(std::env::args().skip(1)).map_err(AppError::Cli)? {
        Cli::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Cli::Run(args) => args,
    };

    // Optional; a missing .env is not an error.
    let _ = dotenvy::dotenv();

    let config = config::load(args.config_path.as_deref())?;

    let log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(log_level, args.log_level.is_some())?;

    info!(
        bot_name = %config.bot_name,
        configured_log_level = %config.log_level,
        cli_log_level = ?args.log_level,
        provider = %config.llm.provider,
        model = %config.model_name(),
        "config loaded"
    );

    let client = llm::providers::build(&config.llm, config.llm_api_key.clone())?;

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down channels");
            ctrlc_token.cancel();
        }
    });

    let result = comms::start(&config, client, shutdown.clone()).join().await;

    shutdown.cancel();
    info!("gemini-bridge stopped");
    result
}

// ── command line ─────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Cli {
    Help,
    Run(RunArgs),
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunArgs {
    /// Set only by `-q` / `-v`; beats `RUST_LOG` and the config.
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_args<I>(args: I) -> Result<Cli, String>
where
    I: IntoIterator<Item = String>,
{
    let mut run = RunArgs::default();
    let mut quiet = false;
    let mut verbose = 0usize;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Cli::Help),
            "-f" | "--config" => {
                let path = args.next().ok_or_else(|| format!("{arg} requires a path"))?;
                run.config_path = Some(path);
            }
            "-q" | "--quiet" => quiet = true,
            "--verbose" => verbose += 1,
            flag if is_verbosity_cluster(flag) => verbose += flag.len() - 1,
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    run.config_path = Some(path.to_string());
                } else {
                    return Err(format!("unknown argument '{other}' (see --help)"));
                }
            }
        }
    }

    run.log_level = match verbose {
        0 if quiet => Some("warn"),
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    };
    Ok(Cli::Run(run))
}

/// `-v`, `-vv`, `-vvv`, …
fn is_verbosity_cluster(flag: &str) -> bool {
    flag.strip_prefix('-').is_some_and(|vs| !vs.is_empty() && vs.bytes().all(|b| b == b'v'))
}
