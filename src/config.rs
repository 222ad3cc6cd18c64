use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_TOKEN_URL: &str = "https://id.rapt.io/connect/token";
const DEFAULT_SOURCE_API_BASE: &str = "https://api.rapt.io";

#[derive(Debug, Clone)]
pub struct Config {
    pub source_username: String,
    pub source_api_key: String,
    pub sink_uri: String,
    pub token_url: String,
    pub source_api_base: String,

    /// Absence selects the ephemeral credential path: no durable store is
    /// touched and every process start begins with a fresh issuance.
    pub credential_path: Option<PathBuf>,

    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub run_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let source_username = env_string("BREW_FORWARDER_SOURCE_USERNAME", None)?;
        let source_api_key = env_string("BREW_FORWARDER_SOURCE_API_KEY", None)?;

        let sink_uri = env_string("BREW_FORWARDER_SINK_URI", None)?;
        Url::parse(&sink_uri).context("invalid BREW_FORWARDER_SINK_URI")?;

        let token_url = env_string(
            "BREW_FORWARDER_TOKEN_URL",
            Some(DEFAULT_TOKEN_URL.to_string()),
        )?;
        let source_api_base = env_string(
            "BREW_FORWARDER_SOURCE_API_BASE",
            Some(DEFAULT_SOURCE_API_BASE.to_string()),
        )?;

        let credential_path = env_optional("BREW_FORWARDER_CREDENTIAL_PATH").map(PathBuf::from);

        // 20-minute cadence exceeds the sink's publish-rate ceiling.
        let poll_interval =
            Duration::from_secs(env_u64("BREW_FORWARDER_POLL_INTERVAL_SECONDS", Some(1200))?);
        let http_timeout =
            Duration::from_secs(env_u64("BREW_FORWARDER_HTTP_TIMEOUT_SECONDS", Some(20))?);

        let run_once = env_optional("BREW_FORWARDER_RUN_ONCE")
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            source_username,
            source_api_key,
            sink_uri,
            token_url,
            source_api_base,
            credential_path,
            poll_interval,
            http_timeout,
            run_once,
        })
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
