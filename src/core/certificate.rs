use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use pem::Pem;
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

/// Facts about the leaf certificate of a PEM chain.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub sans: Vec<String>,
    pub serial: String,
    pub fingerprint: String,
}

/// Parses the first certificate of `chain_pem`.
pub fn inspect_certificate(chain_pem: &str) -> Result<CertificateInfo> {
    let (_, pem_block) = parse_x509_pem(chain_pem.as_bytes())
        .map_err(|e| anyhow!("failed to parse certificate PEM: {e}"))?;
    if pem_block.label != "CERTIFICATE" {
        return Err(anyhow!(
            "expected a CERTIFICATE block, found {}",
            pem_block.label
        ));
    }
    let cert = pem_block
        .parse_x509()
        .map_err(|e| anyhow!("failed to parse certificate: {e}"))?;

    let not_before = timestamp(cert.validity().not_before.timestamp())?;
    let not_after = timestamp(cert.validity().not_after.timestamp())?;

    let sans = cert
        .subject_alternative_name()
        .map_err(|e| anyhow!("invalid subjectAltName extension: {e}"))?
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_lowercase()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let fingerprint = {
        let mut hasher = Sha256::new();
        hasher.update(&pem_block.contents);
        hex::encode(hasher.finalize())
    };

    Ok(CertificateInfo {
        not_before,
        not_after,
        sans,
        serial: cert.raw_serial_as_string(),
        fingerprint,
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| anyhow!("certificate timestamp out of range: {secs}"))
}

/// Leaf certificate and the remaining CA bundle, both PEM.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub leaf: String,
    pub ca_bundle: String,
}

pub fn split_chain(chain_pem: &str) -> Result<CertificateBundle> {
    let blocks = pem::parse_many(chain_pem)
        .map_err(|err| anyhow!("failed to parse certificate chain PEM: {err}"))?;
    let encoded: Vec<String> = blocks
        .into_iter()
        .filter(|block: &Pem| block.tag() == "CERTIFICATE")
        .map(|block| pem::encode(&block))
        .collect();

    let (leaf, rest) = encoded
        .split_first()
        .ok_or_else(|| anyhow!("no certificate PEM blocks found"))?;
    Ok(CertificateBundle {
        leaf: leaf.clone(),
        ca_bundle: rest.join(""),
    })
}
