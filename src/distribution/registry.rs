use std::sync::Arc;

use super::DistributionTarget;
use super::bunnycdn::BunnyCdnTarget;
use super::stackpath::{StackPathConfig, StackPathTarget};
use crate::core::config::{ConfigError, Settings};

pub const SUPPORTED_RUNNERS: &[&str] = &["bunnycdn", "stackpath"];

fn required(value: &str, name: &'static str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(value.to_string())
    }
}

/// Builds one target per configured runner name, in configuration order.
pub fn build_targets(settings: &Settings) -> Result<Vec<Arc<dyn DistributionTarget>>, ConfigError> {
    let mut targets: Vec<Arc<dyn DistributionTarget>> = Vec::new();
    for runner in &settings.runners.0 {
        let target: Arc<dyn DistributionTarget> = match runner.trim().to_lowercase().as_str() {
            "bunnycdn" => {
                let api_key = required(&settings.bunnycdn_api_key, "BUNNYCDN_API_KEY")?;
                if settings.bunnycdn_pull_zone_id <= 0 {
                    return Err(ConfigError::Missing("BUNNYCDN_PULL_ZONE_ID"));
                }
                Arc::new(BunnyCdnTarget::new(api_key, settings.bunnycdn_pull_zone_id))
            }
            "stackpath" => Arc::new(StackPathTarget::new(StackPathConfig {
                client_id: required(&settings.stackpath_client_id, "STACKPATH_API_CLIENT_ID")?,
                client_secret: required(
                    &settings.stackpath_client_secret,
                    "STACKPATH_API_CLIENT_SECRET",
                )?,
                stack_id: required(&settings.stackpath_stack_id, "STACKPATH_STACK_ID")?,
                site_id: required(&settings.stackpath_site_id, "STACKPATH_SITE_ID")?,
            })),
            other => return Err(ConfigError::UnknownRunner(other.to_string())),
        };
        if targets.iter().any(|existing| existing.name() == target.name()) {
            log::warn!("[registry] runner {} listed twice, ignoring duplicate", target.name());
            continue;
        }
        targets.push(target);
    }
    log::info!(
        "[registry] configured runners: {}",
        targets
            .iter()
            .map(|target| target.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(targets)
}
