use keyring::Entry;
use zeroize::Zeroizing;

use super::store::{SecretStore, SecretStoreError, decode_record, encode_record};
use crate::core::types::CertificateRecord;

pub const KEYRING_SERVICE: &str = "autocert";

/// OS-backed storage using the `keyring` crate (Keychain/Credential Manager/Secret Service).
pub struct KeyringSecretStore {
    service: String,
    account: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, SecretStoreError> {
        Entry::new(&self.service, &self.account).map_err(|err| self.map_error(err))
    }

    fn map_error(&self, err: keyring::Error) -> SecretStoreError {
        match err {
            keyring::Error::NoEntry => SecretStoreError::NotFound(self.account.clone()),
            keyring::Error::NoStorageAccess(inner) => {
                SecretStoreError::Unavailable(inner.to_string())
            }
            keyring::Error::PlatformFailure(inner) => {
                SecretStoreError::Unavailable(inner.to_string())
            }
            other => SecretStoreError::Store(other.to_string()),
        }
    }

    fn write(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        let encoded = Zeroizing::new(encode_record(record)?);
        let document = std::str::from_utf8(&encoded)
            .map_err(|err| SecretStoreError::Store(format!("record is not UTF-8: {err}")))?;
        self.entry()?
            .set_password(document)
            .map_err(|err| self.map_error(err))
    }
}

impl SecretStore for KeyringSecretStore {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn read(&self) -> Result<Option<CertificateRecord>, SecretStoreError> {
        match self.entry()?.get_password() {
            Ok(document) => {
                let document = Zeroizing::new(document);
                decode_record(document.as_bytes()).map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(self.map_error(err)),
        }
    }

    fn create(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        if self.read()?.is_some() {
            return Err(SecretStoreError::AlreadyExists(self.account.clone()));
        }
        self.write(record)
    }

    fn update(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        if self.read()?.is_none() {
            return Err(SecretStoreError::NotFound(self.account.clone()));
        }
        self.write(record)
    }
}
