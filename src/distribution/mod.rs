//! Pushing certificates to CDN and edge providers.

pub mod bunnycdn;
pub mod fanout;
pub mod registry;
pub mod stackpath;

use thiserror::Error;

use crate::core::types::CertificateRecord;

pub use fanout::{CancellationFlag, RunnerFanOut};
pub use registry::build_targets;

#[derive(Debug, Error)]
pub enum DistributionError {
    /// The provider does not know one of the requested hostnames. Nothing was changed.
    #[error("hostname {0} is not configured on the provider, add it first")]
    UnknownHostname(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("invalid certificate input: {0}")]
    InvalidInput(String),
    #[error("dispatch cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for DistributionError {
    fn from(err: anyhow::Error) -> Self {
        DistributionError::Provider(format!("{err:#}"))
    }
}

/// One provider able to install a certificate for a set of hostnames.
///
/// Implementations must be idempotent, and must verify every hostname is
/// known to the provider before changing anything.
pub trait DistributionTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Installs `record` for `hostnames`. The returned message, if any, ends
    /// up in the dispatch report.
    fn exec(
        &self,
        hostnames: &[String],
        record: &CertificateRecord,
    ) -> Result<Option<String>, DistributionError>;
}
