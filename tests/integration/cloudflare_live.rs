//! Runs against a real Cloudflare zone. Needs `--features integration-tests`
//! plus `DNS_TEST_CLOUDFLARE_TOKEN` and `DNS_TEST_CLOUDFLARE_ZONE`.

use std::env;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;

use autocert::issuance::dns_providers::{CLOUDFLARE_API_URL, ChallengePublisher, CloudflarePublisher};

struct LiveConfig {
    token: String,
    zone: String,
}

#[derive(Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Record {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    result: Vec<T>,
    success: bool,
}

/// Removes the test record even when an assertion fails.
struct Cleanup<'a> {
    publisher: &'a CloudflarePublisher,
    name: String,
}

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        let _ = self.publisher.cleanup_txt(&self.name);
    }
}

fn load_config() -> Result<LiveConfig> {
    Ok(LiveConfig {
        token: env::var("DNS_TEST_CLOUDFLARE_TOKEN").context("DNS_TEST_CLOUDFLARE_TOKEN not set")?,
        zone: env::var("DNS_TEST_CLOUDFLARE_ZONE").context("DNS_TEST_CLOUDFLARE_ZONE not set")?,
    })
}

fn record_name(zone: &str, label: &str) -> String {
    format!("_acme-challenge.autocert-test.{}.{}", label, zone)
}

fn txt_contents(config: &LiveConfig, name: &str) -> Result<Vec<String>> {
    let client = Client::new();
    let zones: ListResponse<Zone> = client
        .get(format!("{CLOUDFLARE_API_URL}/zones"))
        .bearer_auth(&config.token)
        .send()?
        .json()?;
    let zone = zones
        .result
        .iter()
        .find(|zone| zone.name == config.zone)
        .ok_or_else(|| anyhow!("zone {} not visible to token", config.zone))?;

    let records: ListResponse<Record> = client
        .get(format!("{CLOUDFLARE_API_URL}/zones/{}/dns_records", zone.id))
        .query(&[("type", "TXT"), ("name", name)])
        .bearer_auth(&config.token)
        .send()?
        .json()?;
    if !records.success {
        return Err(anyhow!("Cloudflare record listing failed"));
    }
    Ok(records.result.into_iter().filter_map(|r| r.content).collect())
}

#[test]
fn create_is_idempotent_and_cleanup_removes_record() -> Result<()> {
    let config = load_config()?;
    let name = record_name(&config.zone, "idempotent");
    let publisher = CloudflarePublisher::new(config.token.clone());
    let _cleanup = Cleanup {
        publisher: &publisher,
        name: name.clone(),
    };

    publisher.create_txt(&name, "autocert-live-value")?;
    publisher.create_txt(&name, "autocert-live-value")?;
    let contents = txt_contents(&config, &name)?;
    if contents != vec!["\"autocert-live-value\"".to_string()] {
        return Err(anyhow!("expected one TXT record, found {:?}", contents));
    }

    publisher.cleanup_txt(&name)?;
    publisher.cleanup_txt(&name)?;
    if !txt_contents(&config, &name)?.is_empty() {
        return Err(anyhow!("TXT record survived cleanup"));
    }
    Ok(())
}

#[test]
fn invalid_token_is_rejected() -> Result<()> {
    let config = load_config()?;
    let publisher = CloudflarePublisher::new("invalid-token");
    let err = match publisher.create_txt(&record_name(&config.zone, "bad-token"), "x") {
        Ok(()) => return Err(anyhow!("expected invalid token error")),
        Err(err) => err,
    };
    let message = err.to_string().to_lowercase();
    if !message.contains("authentication") && !message.contains("400") {
        return Err(anyhow!("unexpected error for invalid token: {}", message));
    }
    Ok(())
}
