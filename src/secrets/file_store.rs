use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::debug;
use uuid::Uuid;

use super::store::{SecretStore, SecretStoreError, decode_record, encode_record};
use crate::core::types::CertificateRecord;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Certificate record kept as a JSON document on local disk.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes into a sibling temp file then renames it over the target, so
    /// readers see either the old document or the new one.
    fn replace(&self, content: &[u8]) -> Result<(), SecretStoreError> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|err| {
            SecretStoreError::Unavailable(format!("cannot create {}: {err}", parent.display()))
        })?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "record".to_string());
        let temp_path = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().as_simple()));

        let write = || -> std::io::Result<()> {
            let mut file = secure_options().create_new(true).open(&temp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        };
        write().map_err(|err| {
            let _ = fs::remove_file(&temp_path);
            SecretStoreError::Store(format!("failed to write {}: {err}", self.path.display()))
        })
    }
}

fn secure_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    options
}

impl SecretStore for FileSecretStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn read(&self) -> Result<Option<CertificateRecord>, SecretStoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => decode_record(&bytes).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("[file-store] no record at {}", self.path.display());
                Ok(None)
            }
            Err(err) => Err(SecretStoreError::Unavailable(format!(
                "failed to read {}: {err}",
                self.path.display()
            ))),
        }
    }

    fn create(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        if self.path.exists() {
            return Err(SecretStoreError::AlreadyExists(
                self.path.display().to_string(),
            ));
        }
        self.replace(&encode_record(record)?)
    }

    fn update(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        if !self.path.exists() {
            return Err(SecretStoreError::NotFound(self.path.display().to_string()));
        }
        self.replace(&encode_record(record)?)
    }
}
