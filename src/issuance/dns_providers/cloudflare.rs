use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};

use super::ChallengePublisher;
use crate::domain::matches_zone;
use crate::http::{self, HttpClient};

pub const CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Publishes DNS-01 TXT records through the Cloudflare v4 API.
pub struct CloudflarePublisher {
    api_token: String,
    base_url: String,
    zones: Mutex<Option<Vec<CloudflareZone>>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CloudflareZone {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct CloudflareZoneListResponse {
    result: Vec<CloudflareZone>,
    success: bool,
}

#[derive(Serialize)]
struct CloudflareDnsRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
}

#[derive(Deserialize)]
struct CloudflareDnsRecordResult {
    id: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CloudflareDnsRecordListResponse {
    result: Vec<CloudflareDnsRecordResult>,
    success: bool,
}

#[derive(Deserialize)]
struct CloudflareWriteResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<CloudflareError>,
}

#[derive(Deserialize)]
struct CloudflareError {
    code: u32,
    message: String,
}

impl CloudflarePublisher {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self::with_base_url(api_token, CLOUDFLARE_API_URL)
    }

    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            zones: Mutex::new(None),
        }
    }

    fn format_txt_content(value: &str) -> String {
        format!("\"{}\"", value.trim().trim_matches('"'))
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_token)
    }

    fn list_zones(&self) -> Result<Vec<CloudflareZone>> {
        let mut cache = self
            .zones
            .lock()
            .map_err(|_| anyhow!("Cloudflare zone cache poisoned"))?;
        if let Some(zones) = cache.as_ref() {
            return Ok(zones.clone());
        }

        let response = HttpClient::shared()
            .get(format!("{}/zones", self.base_url))
            .query(&[("per_page", "50")])
            .header("Authorization", self.auth_header())
            .send()
            .context("failed to list Cloudflare zones")?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(http::status_error("Cloudflare", status, response.text().ok()));
        }
        let zone_list: CloudflareZoneListResponse = response
            .json()
            .context("failed to parse Cloudflare zone list response")?;
        if !zone_list.success {
            return Err(anyhow!("Cloudflare API returned unsuccessful response"));
        }

        *cache = Some(zone_list.result.clone());
        Ok(zone_list.result)
    }

    /// Picks the most specific zone containing `record_name`.
    fn zone_id_for(&self, record_name: &str) -> Result<String> {
        let domain = record_name.trim_start_matches("_acme-challenge.");
        self.list_zones()?
            .into_iter()
            .filter(|zone| matches_zone(domain, &zone.name))
            .max_by_key(|zone| zone.name.len())
            .map(|zone| zone.id)
            .ok_or_else(|| anyhow!("no Cloudflare zone found for {}", record_name))
    }

    fn list_txt_records(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> Result<Vec<CloudflareDnsRecordResult>> {
        let response = HttpClient::shared()
            .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .query(&[("type", "TXT"), ("name", record_name)])
            .header("Authorization", self.auth_header())
            .send()
            .context("failed to list Cloudflare DNS records")?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(http::status_error("Cloudflare", status, response.text().ok()));
        }
        let list: CloudflareDnsRecordListResponse = response
            .json()
            .context("failed to parse Cloudflare DNS record list")?;
        if !list.success {
            return Err(anyhow!("Cloudflare API returned unsuccessful response"));
        }
        Ok(list.result)
    }
}

impl ChallengePublisher for CloudflarePublisher {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn create_txt(&self, record_name: &str, value: &str) -> Result<()> {
        let zone_id = self.zone_id_for(record_name)?;
        let content = Self::format_txt_content(value);

        let existing = self.list_txt_records(&zone_id, record_name)?;
        if existing
            .iter()
            .any(|record| record.content.as_deref() == Some(content.as_str()))
        {
            debug!("[cloudflare] {} already carries the expected value", record_name);
            return Ok(());
        }

        let response = HttpClient::shared()
            .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .header("Authorization", self.auth_header())
            .json(&CloudflareDnsRecord {
                record_type: "TXT",
                name: record_name,
                content,
                ttl: 120,
            })
            .send()
            .context("failed to create Cloudflare DNS record")?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        let parsed = serde_json::from_str::<CloudflareWriteResponse>(&body).ok();
        // 81058: an identical record already exists.
        if parsed
            .as_ref()
            .is_some_and(|parsed| parsed.errors.iter().any(|err| err.code == 81058))
        {
            return Ok(());
        }
        if !status.is_success() {
            return Err(http::status_error("Cloudflare", status, Some(body)));
        }
        match parsed {
            Some(parsed) if parsed.success => Ok(()),
            Some(parsed) => Err(anyhow!(
                "Cloudflare API error: {}",
                parsed
                    .errors
                    .iter()
                    .map(|err| format!("{}: {}", err.code, err.message))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            None => Err(anyhow!("failed to parse Cloudflare DNS record response")),
        }
    }

    fn cleanup_txt(&self, record_name: &str) -> Result<()> {
        let zone_id = self.zone_id_for(record_name)?;
        let records = self.list_txt_records(&zone_id, record_name)?;
        let mut failures = Vec::new();
        for record in records {
            let response = HttpClient::shared()
                .delete(format!(
                    "{}/zones/{}/dns_records/{}",
                    self.base_url, zone_id, record.id
                ))
                .header("Authorization", self.auth_header())
                .send()
                .context("failed to delete Cloudflare DNS record")?;
            let status = response.status();
            if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
                failures.push(format!("{}: {}", record.id, status));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "failed to delete {} Cloudflare record(s): {}",
                failures.len(),
                failures.join(", ")
            ))
        }
    }
}
