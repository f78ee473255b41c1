use clap::ValueEnum;
use thiserror::Error;

use crate::core::types::{AccountIdentity, CertificateRecord};

/// What a renewal does with the certificate private key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyPolicy {
    /// Keep the stored key and rotate only the certificate.
    #[default]
    Reuse,
    /// Generate a new key on every renewal.
    Rotate,
}

/// Obtains certificates for a hostname set on behalf of an ACME account.
///
/// Both operations return a complete record carrying the identity and the
/// requested hostnames; the caller persists it unchanged.
pub trait CertificateAuthority: Send + Sync {
    fn issue(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
    ) -> Result<CertificateRecord, AuthorityError>;

    fn renew(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
        existing_private_key: &str,
    ) -> Result<CertificateRecord, AuthorityError>;
}

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("certificate authority unavailable: {0}")]
    Unavailable(String),
    #[error("certificate authority configuration invalid: {0}")]
    InvalidConfig(String),
    #[error("certificate authority rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("certificate authority operation failed: {0}")]
    Operation(String),
}

impl AuthorityError {
    /// Classifies an error message from the ACME exchange.
    pub fn from_acme_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("ratelimited") || lowered.contains("rate limit") {
            AuthorityError::RateLimited(message)
        } else if lowered.contains("connection")
            || lowered.contains("timed out")
            || lowered.contains("dns error")
        {
            AuthorityError::Unavailable(message)
        } else {
            AuthorityError::Operation(message)
        }
    }
}
