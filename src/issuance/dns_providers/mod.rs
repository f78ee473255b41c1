use anyhow::Result;

use crate::core::config::{ConfigError, Settings};

mod cloudflare;

pub use cloudflare::{CLOUDFLARE_API_URL, CloudflarePublisher};

/// Publishes and removes the TXT records that prove control of a domain.
pub trait ChallengePublisher: Send + Sync {
    fn name(&self) -> &'static str;
    fn create_txt(&self, record_name: &str, value: &str) -> Result<()>;
    fn cleanup_txt(&self, record_name: &str) -> Result<()>;
}

/// Builds the publisher named by `AUTOCERT_PROVIDER`.
pub fn publisher_for_provider(
    settings: &Settings,
) -> Result<Box<dyn ChallengePublisher>, ConfigError> {
    match settings.challenge_provider.trim().to_lowercase().as_str() {
        "cloudflare" => {
            if settings.cloudflare_api_token.trim().is_empty() {
                return Err(ConfigError::Missing("CLOUDFLARE_DNS_API_TOKEN"));
            }
            Ok(Box::new(CloudflarePublisher::new(
                settings.cloudflare_api_token.clone(),
            )))
        }
        other => Err(ConfigError::UnknownChallengeProvider(other.to_string())),
    }
}
