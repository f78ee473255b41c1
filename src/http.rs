use std::sync::OnceLock;
use std::time::Duration;

use anyhow::anyhow;
use log::warn;
use reqwest::StatusCode;
use reqwest::blocking::Client;

pub const TIMEOUT_ENV: &str = "AUTOCERT_HTTP_TIMEOUT_SECS";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct HttpClient;

impl HttpClient {
    /// Blocking client shared by every provider adapter.
    pub fn shared() -> &'static Client {
        static CLIENT: OnceLock<Client> = OnceLock::new();
        CLIENT.get_or_init(|| {
            let timeout = resolve_timeout();
            Client::builder()
                .timeout(timeout)
                .user_agent(concat!("autocert/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|err| {
                    warn!("[http] failed to build shared client: {err}");
                    Client::new()
                })
        })
    }
}

fn resolve_timeout() -> Duration {
    let timeout = std::env::var(TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout == 0 {
        warn!("[http] invalid timeout value; using default");
        return Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    }
    Duration::from_secs(timeout)
}

/// Maps a non-success provider response to an error carrying the provider name.
pub fn status_error(provider: &str, status: StatusCode, body: Option<String>) -> anyhow::Error {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return anyhow!("{provider} authentication failed");
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return anyhow!("{provider} rate limit exceeded");
    }
    if let Some(body) = body.filter(|body| !body.trim().is_empty()) {
        return anyhow!("{provider} API error ({status}): {body}");
    }
    anyhow!("{provider} API error: {status}")
}
