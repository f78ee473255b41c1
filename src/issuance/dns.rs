use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::http::HttpClient;

const GOOGLE_DOH_URL: &str = "https://dns.google/resolve";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationState {
    Pending,
    Found,
    NxDomain,
    WrongContent,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DnsPropagationResult {
    pub state: PropagationState,
    pub reason: Option<String>,
    pub observed_values: Vec<String>,
}

/// Name of the TXT record that carries the DNS-01 proof for `domain`.
pub fn record_name(domain: &str) -> String {
    let trimmed = domain.trim_end_matches('.').trim_start_matches("*.");
    if trimmed.starts_with("_acme-challenge.") {
        trimmed.to_string()
    } else {
        format!("_acme-challenge.{trimmed}")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleDnsAnswer {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleDnsResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "Answer")]
    pub answer: Option<Vec<GoogleDnsAnswer>>,
}

/// Queries Google DNS over HTTPS for the TXT record.
pub fn query_txt(record_name: &str, expected_value: &str) -> Result<DnsPropagationResult> {
    info!("[dns] querying Google DNS for {}", record_name);
    let response = HttpClient::shared()
        .get(GOOGLE_DOH_URL)
        .query(&[("name", record_name), ("type", "TXT")])
        .header("Accept", "application/dns-json")
        .send()
        .context("failed to query Google DNS")?;
    let body: GoogleDnsResponse = response
        .json()
        .context("failed to parse Google DNS response")?;
    Ok(interpret_dns_response(&body, record_name, expected_value))
}

fn trim_txt_quotes(value: &str) -> String {
    value.trim().trim_matches('"').trim().to_string()
}

pub fn interpret_dns_response(
    response: &GoogleDnsResponse,
    record_name: &str,
    expected_value: &str,
) -> DnsPropagationResult {
    let expected = trim_txt_quotes(expected_value);
    let observed: Vec<String> = response
        .answer
        .iter()
        .flatten()
        .filter_map(|answer| answer.data.as_deref())
        .map(trim_txt_quotes)
        .collect();

    if observed.iter().any(|value| *value == expected) {
        return DnsPropagationResult {
            state: PropagationState::Found,
            reason: None,
            observed_values: observed,
        };
    }
    if !observed.is_empty() {
        return DnsPropagationResult {
            state: PropagationState::WrongContent,
            reason: Some("TXT record present with different value".to_string()),
            observed_values: observed,
        };
    }
    match response.status {
        0 => DnsPropagationResult {
            state: PropagationState::Pending,
            reason: Some("record not found yet".to_string()),
            observed_values: observed,
        },
        3 => DnsPropagationResult {
            state: PropagationState::NxDomain,
            reason: Some("record not found (NXDOMAIN)".to_string()),
            observed_values: observed,
        },
        status => {
            warn!("[dns] unexpected status {} for {}", status, record_name);
            DnsPropagationResult {
                state: PropagationState::Error,
                reason: Some(format!("resolver returned status {status}")),
                observed_values: observed,
            }
        }
    }
}

/// Polls public DNS until the expected value is visible or `timeout` passes.
///
/// A different value does not stop polling: apex and wildcard names share one
/// record name and their proofs may land in either order.
pub fn poll_dns_propagation(
    record_name: &str,
    expected_value: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<DnsPropagationResult> {
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(
            "[dns] propagation check attempt {} for {}",
            attempt, record_name
        );

        let result = match query_txt(record_name, expected_value) {
            Ok(result) => result,
            Err(err) => DnsPropagationResult {
                state: PropagationState::Error,
                reason: Some(err.to_string()),
                observed_values: Vec::new(),
            },
        };

        if result.state == PropagationState::Found {
            debug!(
                "[dns] record found after {}ms (attempt {})",
                started.elapsed().as_millis(),
                attempt
            );
            return Ok(result);
        }

        if started.elapsed() >= timeout {
            warn!(
                "[dns] propagation timeout after {}ms (attempt {}), last state: {:?}",
                started.elapsed().as_millis(),
                attempt,
                result.state
            );
            return Ok(result);
        }
        thread::sleep(interval);
    }
}
