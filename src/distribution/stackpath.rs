//! StackPath CDN target.
//!
//! Authenticates with client credentials, checks the site's delivery
//! domains, then creates or updates the stack certificate whose SAN set
//! equals the requested hostnames.

use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use reqwest::blocking::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::{DistributionError, DistributionTarget};
use crate::core::certificate::split_chain;
use crate::core::types::CertificateRecord;
use crate::domain::hostname_set;
use crate::http::{HttpClient, status_error};

pub const STACKPATH_API_URL: &str = "https://gateway.stackpath.com";

const ACTIVE_FILTER: &str = "status=\"ACTIVE\"";
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct StackPathConfig {
    pub client_id: String,
    pub client_secret: String,
    pub stack_id: String,
    pub site_id: String,
}

pub struct StackPathTarget {
    config: StackPathConfig,
    base_url: String,
    token: Mutex<Option<String>>,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default)]
    page_info: PageInfo,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DeliveryDomain {
    domain: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackCertificate {
    id: String,
    #[serde(default)]
    subject_alternative_names: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateInput<'a> {
    certificate: &'a str,
    key: &'a str,
    ca_bundle: &'a str,
}

impl StackPathTarget {
    pub fn new(config: StackPathConfig) -> Self {
        Self::with_base_url(config, STACKPATH_API_URL)
    }

    pub fn with_base_url(config: StackPathConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(status_error("StackPath", status, response.text().ok()))
        }
    }

    /// Bearer token, fetched once and reused for the lifetime of the target.
    fn token(&self) -> Result<String> {
        let mut cached = self
            .token
            .lock()
            .map_err(|_| anyhow!("StackPath token cache poisoned"))?;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let response = HttpClient::shared()
            .post(format!("{}/identity/v1/oauth2/token", self.base_url))
            .json(&TokenRequest {
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                grant_type: "client_credentials",
            })
            .send()
            .context("StackPath token request failed")?;
        let token: TokenResponse = Self::check(response)?
            .json()
            .context("invalid StackPath token response")?;
        *cached = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request
            .bearer_auth(self.token()?)
            .header("Accept", "application/json"))
    }

    fn stack_url(&self) -> String {
        format!("{}/cdn/v1/stacks/{}", self.base_url, self.config.stack_id)
    }

    fn collect_pages<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        filter: Option<&str>,
        what: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(filter) = filter {
                query.push(("page_request.filter", filter));
            }
            if let Some(after) = cursor.as_deref() {
                query.push(("page_request.after", after));
            }
            let response = self
                .authorized(HttpClient::shared().get(url).query(&query))?
                .send()
                .with_context(|| format!("StackPath {what} request failed"))?;
            let page: Page<T> = Self::check(response)?
                .json()
                .with_context(|| format!("invalid StackPath {what} response"))?;
            items.extend(page.results);

            match page.page_info.end_cursor {
                Some(next) if page.page_info.has_next_page => cursor = Some(next),
                _ => return Ok(items),
            }
        }
        Err(anyhow!("StackPath {what} listing exceeded {MAX_PAGES} pages"))
    }

    fn delivery_domains(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/sites/{}/delivery-domains",
            self.stack_url(),
            self.config.site_id
        );
        let domains: Vec<DeliveryDomain> = self.collect_pages(&url, None, "delivery domain")?;
        Ok(domains.into_iter().map(|d| d.domain).collect())
    }

    fn active_certificates(&self) -> Result<Vec<StackCertificate>> {
        let url = format!("{}/certificates", self.stack_url());
        self.collect_pages(&url, Some(ACTIVE_FILTER), "certificate")
    }

    fn upload(&self, existing: Option<&str>, input: &CertificateInput<'_>) -> Result<()> {
        let request = match existing {
            Some(id) => HttpClient::shared().put(format!("{}/certificates/{}", self.stack_url(), id)),
            None => HttpClient::shared().post(format!("{}/certificates", self.stack_url())),
        };
        let response = self
            .authorized(request)?
            .json(input)
            .send()
            .context("StackPath certificate upload failed")?;
        Self::check(response)?;
        Ok(())
    }
}

impl DistributionTarget for StackPathTarget {
    fn name(&self) -> &str {
        "stackpath"
    }

    fn exec(
        &self,
        hostnames: &[String],
        record: &CertificateRecord,
    ) -> Result<Option<String>, DistributionError> {
        let bundle = split_chain(&record.certificate_chain)
            .map_err(|err| DistributionError::InvalidInput(err.to_string()))?;

        let known = hostname_set(&self.delivery_domains()?);
        if let Some(missing) = hostnames
            .iter()
            .find(|hostname| !known.contains(&hostname.to_lowercase()))
        {
            return Err(DistributionError::UnknownHostname(missing.clone()));
        }

        let wanted = hostname_set(hostnames);
        let existing = self
            .active_certificates()?
            .into_iter()
            .find(|cert| hostname_set(&cert.subject_alternative_names) == wanted);

        let input = CertificateInput {
            certificate: &bundle.leaf,
            key: &record.private_key,
            ca_bundle: &bundle.ca_bundle,
        };
        match existing {
            Some(cert) => {
                debug!("[stackpath] certificate {} covers the hostnames", cert.id);
                self.upload(Some(&cert.id), &input)?;
                info!("[stackpath] certificate {} updated", cert.id);
                Ok(Some(format!("updated certificate {}", cert.id)))
            }
            None => {
                self.upload(None, &input)?;
                info!("[stackpath] certificate created");
                Ok(Some("created certificate".to_string()))
            }
        }
    }
}
