//! BunnyCDN pull zone target.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::info;
use reqwest::blocking::Response;
use serde::{Deserialize, Serialize};

use super::{DistributionError, DistributionTarget};
use crate::core::types::CertificateRecord;
use crate::domain::hostname_set;
use crate::http::{HttpClient, status_error};

pub const BUNNYCDN_API_URL: &str = "https://api.bunny.net";

pub struct BunnyCdnTarget {
    api_key: String,
    pull_zone_id: i64,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PullZone {
    #[serde(default)]
    hostnames: Vec<PullZoneHostname>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PullZoneHostname {
    value: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddCertificateRequest<'a> {
    hostname: &'a str,
    certificate: String,
    certificate_key: String,
}

impl BunnyCdnTarget {
    pub fn new(api_key: impl Into<String>, pull_zone_id: i64) -> Self {
        Self::with_base_url(api_key, pull_zone_id, BUNNYCDN_API_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        pull_zone_id: i64,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            pull_zone_id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(status_error("BunnyCDN", status, response.text().ok()))
        }
    }

    fn pull_zone_hostnames(&self) -> Result<Vec<String>> {
        let response = HttpClient::shared()
            .get(format!("{}/pullzone/{}", self.base_url, self.pull_zone_id))
            .header("AccessKey", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .context("BunnyCDN pull zone request failed")?;
        let zone: PullZone = Self::check(response)?
            .json()
            .context("invalid BunnyCDN pull zone response")?;
        Ok(zone
            .hostnames
            .into_iter()
            .filter_map(|hostname| hostname.value)
            .collect())
    }

    fn add_certificate(&self, hostname: &str, record: &CertificateRecord) -> Result<()> {
        let body = AddCertificateRequest {
            hostname,
            certificate: STANDARD.encode(record.certificate_chain.as_bytes()),
            certificate_key: STANDARD.encode(record.private_key.as_bytes()),
        };
        let response = HttpClient::shared()
            .post(format!(
                "{}/pullzone/{}/addCertificate",
                self.base_url, self.pull_zone_id
            ))
            .header("AccessKey", &self.api_key)
            .json(&body)
            .send()
            .with_context(|| format!("BunnyCDN certificate upload for {hostname} failed"))?;
        Self::check(response)?;
        Ok(())
    }
}

impl DistributionTarget for BunnyCdnTarget {
    fn name(&self) -> &str {
        "bunnycdn"
    }

    fn exec(
        &self,
        hostnames: &[String],
        record: &CertificateRecord,
    ) -> Result<Option<String>, DistributionError> {
        if record.certificate_chain.trim().is_empty() || record.private_key.trim().is_empty() {
            return Err(DistributionError::InvalidInput(
                "certificate and key are required".into(),
            ));
        }

        let known = hostname_set(&self.pull_zone_hostnames()?);
        if let Some(missing) = hostnames
            .iter()
            .find(|hostname| !known.contains(&hostname.to_lowercase()))
        {
            return Err(DistributionError::UnknownHostname(missing.clone()));
        }

        // Adding a certificate to a hostname replaces whatever it had.
        for hostname in hostnames {
            info!("[bunnycdn] adding certificate for {}", hostname);
            self.add_certificate(hostname, record)?;
        }
        Ok(Some(format!(
            "pull zone {} updated for {} hostname(s)",
            self.pull_zone_id,
            hostnames.len()
        )))
    }
}
