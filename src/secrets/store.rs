use thiserror::Error;

use crate::core::types::CertificateRecord;

/// Errors produced by secret storage backends.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("secret already exists: {0}")]
    AlreadyExists(String),
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    #[error("stored secret is malformed: {0}")]
    Malformed(String),
    #[error("secret store error: {0}")]
    Store(String),
}

/// Durable home of the single certificate record.
///
/// `read` returns `Ok(None)` when nothing has been stored yet. Writes are
/// all-or-nothing: after a failed `create` or `update` the previous record
/// (if any) is still what `read` returns.
pub trait SecretStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn read(&self) -> Result<Option<CertificateRecord>, SecretStoreError>;
    fn create(&self, record: &CertificateRecord) -> Result<(), SecretStoreError>;
    fn update(&self, record: &CertificateRecord) -> Result<(), SecretStoreError>;
}

pub fn encode_record(record: &CertificateRecord) -> Result<Vec<u8>, SecretStoreError> {
    serde_json::to_vec(record)
        .map_err(|err| SecretStoreError::Store(format!("failed to encode record: {err}")))
}

pub fn decode_record(bytes: &[u8]) -> Result<CertificateRecord, SecretStoreError> {
    serde_json::from_slice(bytes)
        .map_err(|err| SecretStoreError::Malformed(format!("invalid record document: {err}")))
}
