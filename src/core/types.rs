use std::fmt;

use serde::{Deserialize, Serialize};

/// ACME account identity. Persisted inside the certificate record so later
/// runs resolve the same account by key instead of registering again.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountIdentity {
    pub email: String,
    /// PEM-encoded account signing key.
    pub private_key: String,
    /// True when the key was loaded from a stored record. Never persisted.
    #[serde(skip)]
    pub registered: bool,
}

impl AccountIdentity {
    pub fn new(email: impl Into<String>, private_key: impl Into<String>, registered: bool) -> Self {
        Self {
            email: email.into(),
            private_key: private_key.into(),
            registered,
        }
    }
}

impl fmt::Debug for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountIdentity")
            .field("email", &self.email)
            .field("private_key", &"<redacted>")
            .field("registered", &self.registered)
            .finish()
    }
}

/// The unit of persisted state.
///
/// Field names on the wire are `private_key`, `certificate`, `user` and
/// `hostnames`; new fields must be optional so older documents keep loading.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateRecord {
    /// PEM-encoded certificate private key.
    pub private_key: String,
    /// PEM certificate chain, leaf first.
    #[serde(rename = "certificate")]
    pub certificate_chain: String,
    #[serde(rename = "user")]
    pub account: AccountIdentity,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

impl fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("private_key", &"<redacted>")
            .field("certificate_chain_len", &self.certificate_chain.len())
            .field("account", &self.account)
            .field("hostnames", &self.hostnames)
            .finish()
    }
}

/// Result of pushing a certificate to a single distribution target.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DistributionOutcome {
    pub target: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DistributionOutcome {
    pub fn success(target: impl Into<String>, message: Option<String>) -> Self {
        Self {
            target: target.into(),
            succeeded: true,
            message,
            error: None,
        }
    }

    pub fn failure(target: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            succeeded: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Run-level summary of a dispatch. Outcomes keep the configured target order.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<DistributionOutcome>,
}

impl DispatchReport {
    /// Report for a run that had nothing to distribute.
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn from_outcomes(outcomes: Vec<DistributionOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|outcome| outcome.succeeded).count();
        Self {
            attempted: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &DistributionOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded)
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
