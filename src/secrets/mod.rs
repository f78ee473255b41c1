pub mod file_store;
pub mod keyring_store;
pub mod memory;
pub mod secret_manager;
pub mod store;

pub use file_store::FileSecretStore;
pub use keyring_store::KeyringSecretStore;
pub use memory::MemorySecretStore;
pub use secret_manager::{SecretManagerConfig, SecretManagerStore};
pub use store::{SecretStore, SecretStoreError};

use crate::core::config::{ConfigError, SecretBackendKind, Settings};

/// Create the secret store selected by `AUTOCERT_SECRET_BACKEND`.
pub fn open_secret_store(settings: &Settings) -> Result<Box<dyn SecretStore>, ConfigError> {
    log::debug!("[secrets] opening {} backend", settings.secret_backend.as_str());
    match settings.secret_backend {
        SecretBackendKind::SecretManager => {
            if settings.google_project_id.trim().is_empty() {
                return Err(ConfigError::Missing("SECRETMANAGER_GOOGLE_PROJECT_ID"));
            }
            if settings.google_access_token.trim().is_empty() {
                log::warn!("[secrets] SECRETMANAGER_ACCESS_TOKEN is empty; requests go out unauthenticated");
            }
            log::info!(
                "[secrets] using Secret Manager secret {} in project {}",
                settings.secret_name,
                settings.google_project_id
            );
            Ok(Box::new(SecretManagerStore::new(SecretManagerConfig::new(
                settings.google_project_id.trim(),
                settings.secret_name.trim(),
                settings.google_access_token.trim(),
            ))))
        }
        SecretBackendKind::File => {
            let path = settings
                .secret_file
                .clone()
                .ok_or(ConfigError::Missing("AUTOCERT_SECRET_FILE"))?;
            let store = FileSecretStore::new(path);
            log::info!("[secrets] using record file {}", store.path().display());
            Ok(Box::new(store))
        }
        SecretBackendKind::Keyring => {
            log::info!(
                "[secrets] using keyring entry {}/{}",
                keyring_store::KEYRING_SERVICE,
                settings.secret_name
            );
            Ok(Box::new(KeyringSecretStore::new(
                keyring_store::KEYRING_SERVICE,
                settings.secret_name.trim(),
            )))
        }
    }
}
