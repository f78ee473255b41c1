use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use super::store::{SecretStore, SecretStoreError, decode_record, encode_record};
use crate::core::types::CertificateRecord;

/// Process-local store. Holds the encoded document so reads exercise the
/// same decoding path as the real backends.
#[derive(Default)]
pub struct MemorySecretStore {
    document: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
    unavailable: Mutex<Option<String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: &CertificateRecord) -> Result<Self, SecretStoreError> {
        let store = Self::new();
        *store.lock()? = Some(encode_record(record)?);
        Ok(store)
    }

    pub fn with_raw(document: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.document.lock() {
            *guard = Some(document.into());
        }
        store
    }

    /// Number of successful `create` and `update` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every later call fail as if the backend were unreachable.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        if let Ok(mut guard) = self.unavailable.lock() {
            *guard = reason.map(str::to_string);
        }
    }

    pub fn current(&self) -> Option<CertificateRecord> {
        self.read().ok().flatten()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Vec<u8>>>, SecretStoreError> {
        self.document
            .lock()
            .map_err(|err| SecretStoreError::Store(format!("memory store poisoned: {err}")))
    }

    fn check_available(&self) -> Result<(), SecretStoreError> {
        match self.unavailable.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(reason) => Err(SecretStoreError::Unavailable(reason.clone())),
                None => Ok(()),
            },
            Err(err) => Err(SecretStoreError::Store(format!("memory store poisoned: {err}"))),
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self) -> Result<Option<CertificateRecord>, SecretStoreError> {
        self.check_available()?;
        self.lock()?.as_deref().map(decode_record).transpose()
    }

    fn create(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        self.check_available()?;
        let mut guard = self.lock()?;
        if guard.is_some() {
            return Err(SecretStoreError::AlreadyExists("memory".into()));
        }
        *guard = Some(encode_record(record)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        self.check_available()?;
        let mut guard = self.lock()?;
        if guard.is_none() {
            return Err(SecretStoreError::NotFound("memory".into()));
        }
        *guard = Some(encode_record(record)?);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
