//! Google Secret Manager backend (REST v1).
//!
//! Each write adds a secret version. `update` disables the version it
//! replaced so only the newest record stays readable.

use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::{info, warn};
use reqwest::StatusCode;
use reqwest::blocking::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use super::store::{SecretStore, SecretStoreError, decode_record, encode_record};
use crate::core::types::CertificateRecord;
use crate::http::{HttpClient, status_error};

pub const SECRET_MANAGER_API_URL: &str = "https://secretmanager.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct SecretManagerConfig {
    pub project_id: String,
    pub secret_id: String,
    /// Version to read; `None` reads `latest`.
    pub version: Option<String>,
    pub access_token: String,
    pub base_url: String,
}

impl SecretManagerConfig {
    pub fn new(
        project_id: impl Into<String>,
        secret_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            secret_id: secret_id.into(),
            version: None,
            access_token: access_token.into(),
            base_url: SECRET_MANAGER_API_URL.to_string(),
        }
    }
}

pub struct SecretManagerStore {
    config: SecretManagerConfig,
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    name: String,
    payload: SecretPayload,
}

#[derive(Serialize, Deserialize)]
struct SecretPayload {
    data: String,
}

#[derive(Serialize)]
struct AddSecretVersionRequest {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretVersion {
    name: String,
}

impl SecretManagerStore {
    pub fn new(config: SecretManagerConfig) -> Self {
        Self { config }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn secret_path(&self) -> String {
        format!(
            "projects/{}/secrets/{}",
            self.config.project_id, self.config.secret_id
        )
    }

    fn version_path(&self) -> String {
        let version = self.config.version.as_deref().unwrap_or("latest");
        format!("{}/versions/{}", self.secret_path(), version)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.access_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.access_token)
        }
    }

    fn send(&self, request: RequestBuilder, action: &str) -> Result<Response, SecretStoreError> {
        self.authorized(request)
            .send()
            .with_context(|| format!("Secret Manager {action} request failed"))
            .map_err(|err| SecretStoreError::Unavailable(format!("{err:#}")))
    }

    fn check(response: Response, action: &str) -> Result<Response, SecretStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let err = status_error("Secret Manager", status, response.text().ok());
        if status.is_server_error() || status == StatusCode::UNAUTHORIZED {
            Err(SecretStoreError::Unavailable(format!("{action}: {err}")))
        } else {
            Err(SecretStoreError::Store(format!("{action}: {err}")))
        }
    }

    fn add_version(&self, record: &CertificateRecord) -> Result<String, SecretStoreError> {
        let body = AddSecretVersionRequest {
            payload: SecretPayload {
                data: STANDARD.encode(encode_record(record)?),
            },
        };
        let request = HttpClient::shared()
            .post(format!("{}/{}:addVersion", self.base(), self.secret_path()))
            .json(&body);
        let response = Self::check(self.send(request, "add version")?, "add version")?;
        let version: SecretVersion = response
            .json()
            .map_err(|err| SecretStoreError::Store(format!("invalid addVersion response: {err}")))?;
        Ok(version.name)
    }

    fn current_version(&self) -> Result<Option<String>, SecretStoreError> {
        let request =
            HttpClient::shared().get(format!("{}/{}", self.base(), self.version_path()));
        let response = self.send(request, "get version")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let version: SecretVersion = Self::check(response, "get version")?
            .json()
            .map_err(|err| SecretStoreError::Store(format!("invalid version response: {err}")))?;
        Ok(Some(version.name))
    }
}

impl SecretStore for SecretManagerStore {
    fn name(&self) -> &'static str {
        "secretmanager"
    }

    fn read(&self) -> Result<Option<CertificateRecord>, SecretStoreError> {
        let request = HttpClient::shared()
            .get(format!("{}/{}:access", self.base(), self.version_path()));
        let response = self.send(request, "access")?;
        if response.status() == StatusCode::NOT_FOUND {
            info!("[secretmanager] {} has no accessible version", self.secret_path());
            return Ok(None);
        }
        let access: AccessSecretVersionResponse = Self::check(response, "access")?
            .json()
            .map_err(|err| SecretStoreError::Malformed(format!("invalid access response: {err}")))?;
        let data = STANDARD
            .decode(access.payload.data.as_bytes())
            .map_err(|err| SecretStoreError::Malformed(format!("payload is not base64: {err}")))?;
        info!("[secretmanager] loaded {}", access.name);
        decode_record(&data).map(Some)
    }

    fn create(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        let request = HttpClient::shared()
            .post(format!(
                "{}/projects/{}/secrets",
                self.base(),
                self.config.project_id
            ))
            .query(&[("secretId", self.config.secret_id.as_str())])
            .json(&serde_json::json!({ "replication": { "automatic": {} } }));
        let response = self.send(request, "create secret")?;
        if response.status() == StatusCode::CONFLICT {
            // An empty secret (pre-created, or left by a failed addVersion)
            // takes the first version; one with a live version is a conflict.
            if self.current_version()?.is_some() {
                return Err(SecretStoreError::AlreadyExists(self.secret_path()));
            }
            warn!(
                "[secretmanager] {} already exists without versions, adding the first one",
                self.secret_path()
            );
        } else {
            Self::check(response, "create secret")?;
        }

        let version = self.add_version(record)?;
        info!("[secretmanager] created {}", version);
        Ok(())
    }

    fn update(&self, record: &CertificateRecord) -> Result<(), SecretStoreError> {
        let previous = self
            .current_version()?
            .ok_or_else(|| SecretStoreError::NotFound(self.secret_path()))?;
        let version = self.add_version(record)?;
        info!("[secretmanager] added {}", version);

        let request = HttpClient::shared()
            .post(format!("{}/{}:disable", self.base(), previous))
            .json(&serde_json::json!({}));
        let disabled = self
            .send(request, "disable version")
            .and_then(|response| Self::check(response, "disable version"));
        if let Err(err) = disabled {
            // The new version is already the latest; the old one only lingers.
            warn!("[secretmanager] failed to disable {}: {}", previous, err);
        }
        Ok(())
    }
}
