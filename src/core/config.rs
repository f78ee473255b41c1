//! Runtime settings.
//!
//! Every option can be given on the command line or through the environment
//! variable named next to it, so container deployments keep working with
//! plain `AUTOCERT_*` variables.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::distribution::registry::SUPPORTED_RUNNERS;
use crate::domain::normalize_hostnames;
use crate::issuance::authority::KeyPolicy;
use crate::lifecycle::validity::DEFAULT_RENEWAL_WINDOW_HOURS;

pub const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("unknown runner: {0} (supported: {})", SUPPORTED_RUNNERS.join(", "))]
    UnknownRunner(String),
    #[error("unknown challenge provider: {0}")]
    UnknownChallengeProvider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretBackendKind {
    /// Google Secret Manager.
    #[value(name = "secretmanager")]
    SecretManager,
    /// JSON document on the local filesystem.
    File,
    /// OS keyring entry.
    Keyring,
}

impl SecretBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretBackendKind::SecretManager => "secretmanager",
            SecretBackendKind::File => "file",
            SecretBackendKind::Keyring => "keyring",
        }
    }
}

/// Comma separated list as accepted by `AUTOCERT_HOSTNAMES` and `AUTOCERT_RUNNERS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommaList(pub Vec<String>);

impl FromStr for CommaList {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(CommaList(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "autocert", version, about = "Issue, renew and distribute TLS certificates")]
pub struct Settings {
    /// Where the certificate record is persisted.
    #[arg(long, env = "AUTOCERT_SECRET_BACKEND", value_enum, default_value = "secretmanager")]
    pub secret_backend: SecretBackendKind,

    /// Name of the secret holding the certificate record.
    #[arg(long, env = "AUTOCERT_SECRET_NAME", default_value = "")]
    pub secret_name: String,

    /// Contact email for the ACME account.
    #[arg(long, env = "AUTOCERT_EMAIL", default_value = "")]
    pub email: String,

    /// DNS provider used to publish DNS-01 challenge records.
    #[arg(long, env = "AUTOCERT_PROVIDER", default_value = "cloudflare")]
    pub challenge_provider: String,

    /// Hostnames covered by the certificate.
    #[arg(long, env = "AUTOCERT_HOSTNAMES", default_value = "")]
    pub hostnames: CommaList,

    /// Renew even when the current certificate is still valid.
    #[arg(long, env = "AUTOCERT_FORCE_RENEW", default_value_t = false)]
    pub force_renew: bool,

    /// Serve HTTP triggers instead of running once.
    #[arg(long, env = "AUTOCERT_LISTENER_MODE", default_value_t = false)]
    pub listener_mode: bool,

    #[arg(long, env = "AUTOCERT_LISTENER_PORT", default_value_t = 8080)]
    pub listener_port: u16,

    /// Distribution targets, for example `bunnycdn,stackpath`.
    #[arg(long, env = "AUTOCERT_RUNNERS", default_value = "")]
    pub runners: CommaList,

    #[arg(long, env = "AUTOCERT_ACME_URL", default_value = LETSENCRYPT_STAGING_URL)]
    pub acme_url: String,

    /// Renew when the certificate expires within this many hours.
    #[arg(long, env = "AUTOCERT_RENEW_BEFORE_HOURS", default_value_t = DEFAULT_RENEWAL_WINDOW_HOURS)]
    pub renew_before_hours: i64,

    /// Whether renewals keep the stored private key or generate a new one.
    #[arg(long, env = "AUTOCERT_KEY_POLICY", value_enum, default_value = "reuse")]
    pub key_policy: KeyPolicy,

    #[arg(long, env = "SECRETMANAGER_GOOGLE_PROJECT_ID", default_value = "")]
    pub google_project_id: String,

    /// OAuth access token for the Secret Manager API.
    #[arg(long, env = "SECRETMANAGER_ACCESS_TOKEN", hide_env_values = true, default_value = "")]
    pub google_access_token: String,

    /// Path of the record document for the `file` backend.
    #[arg(long, env = "AUTOCERT_SECRET_FILE")]
    pub secret_file: Option<PathBuf>,

    #[arg(long, env = "CLOUDFLARE_DNS_API_TOKEN", hide_env_values = true, default_value = "")]
    pub cloudflare_api_token: String,

    #[arg(long, env = "BUNNYCDN_API_KEY", hide_env_values = true, default_value = "")]
    pub bunnycdn_api_key: String,

    #[arg(long, env = "BUNNYCDN_PULL_ZONE_ID", default_value_t = 0)]
    pub bunnycdn_pull_zone_id: i64,

    #[arg(long, env = "STACKPATH_API_CLIENT_ID", default_value = "")]
    pub stackpath_client_id: String,

    #[arg(long, env = "STACKPATH_API_CLIENT_SECRET", hide_env_values = true, default_value = "")]
    pub stackpath_client_secret: String,

    #[arg(long, env = "STACKPATH_STACK_ID", default_value = "")]
    pub stackpath_stack_id: String,

    #[arg(long, env = "STACKPATH_SITE_ID", default_value = "")]
    pub stackpath_site_id: String,
}

impl Settings {
    /// Checks cross-field requirements and normalizes hostnames in place.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.secret_name.trim().is_empty() {
            return Err(ConfigError::Missing("AUTOCERT_SECRET_NAME"));
        }
        if self.hostnames.0.is_empty() {
            return Err(ConfigError::Missing("AUTOCERT_HOSTNAMES"));
        }
        if self.runners.0.is_empty() {
            return Err(ConfigError::Missing("AUTOCERT_RUNNERS"));
        }
        if self.renew_before_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "AUTOCERT_RENEW_BEFORE_HOURS",
                reason: "must be a positive number of hours".into(),
            });
        }

        self.hostnames = CommaList(normalize_hostnames(&self.hostnames.0).map_err(|err| {
            ConfigError::Invalid {
                name: "AUTOCERT_HOSTNAMES",
                reason: err.to_string(),
            }
        })?);
        self.runners = CommaList(
            self.runners
                .0
                .iter()
                .map(|runner| runner.to_lowercase())
                .collect(),
        );

        match self.secret_backend {
            SecretBackendKind::SecretManager if self.google_project_id.trim().is_empty() => {
                return Err(ConfigError::Missing("SECRETMANAGER_GOOGLE_PROJECT_ID"));
            }
            SecretBackendKind::File if self.secret_file.is_none() => {
                return Err(ConfigError::Missing("AUTOCERT_SECRET_FILE"));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn renewal_window(&self) -> Duration {
        Duration::hours(self.renew_before_hours)
    }
}
