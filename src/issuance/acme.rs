use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use acme_lib::{
    Directory, DirectoryUrl, Error as AcmeError,
    order::{Auth, NewOrder},
    persist::{Persist, PersistKey, PersistKind},
};
use anyhow::{Result, anyhow};
use log::{info, warn};

use super::authority::{AuthorityError, CertificateAuthority, KeyPolicy};
use super::dns::{PropagationState, poll_dns_propagation, record_name};
use super::dns_providers::ChallengePublisher;
use super::keys::generate_certificate_key_pem;
use crate::core::certificate::inspect_certificate;
use crate::core::types::{AccountIdentity, CertificateRecord};
use crate::domain::hostnames_match;

const CHALLENGE_VALIDATE_DELAY_MS: u64 = 2000;
const FINALIZE_DELAY_MS: u64 = 5000;

/// In-memory persistence for acme-lib that avoids disk I/O and lets us seed the ACME account key.
#[derive(Clone, Default)]
pub struct EphemeralPersist {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl EphemeralPersist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account_key(&self, realm: &str, pem: &[u8]) -> Result<()> {
        let key = PersistKey::new(realm, PersistKind::AccountPrivateKey, "acme_account");
        self.put(&key, pem).map_err(|e| anyhow!(e.to_string()))
    }
}

impl Persist for EphemeralPersist {
    fn put(&self, key: &PersistKey, value: &[u8]) -> acme_lib::Result<()> {
        let mut lock = self
            .inner
            .lock()
            .map_err(|e| AcmeError::Other(e.to_string()))?;
        lock.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &PersistKey) -> acme_lib::Result<Option<Vec<u8>>> {
        let lock = self
            .inner
            .lock()
            .map_err(|e| AcmeError::Other(e.to_string()))?;
        Ok(lock.get(&key.to_string()).cloned())
    }
}

/// ACME certificate authority using DNS-01 challenges.
pub struct AcmeAuthority {
    directory_url: String,
    publisher: Box<dyn ChallengePublisher>,
    key_policy: KeyPolicy,
    propagation_timeout: Duration,
    propagation_interval: Duration,
}

impl AcmeAuthority {
    pub fn new(
        directory_url: impl Into<String>,
        publisher: Box<dyn ChallengePublisher>,
        key_policy: KeyPolicy,
    ) -> Self {
        Self {
            directory_url: directory_url.into(),
            publisher,
            key_policy,
            propagation_timeout: Duration::from_secs(120),
            propagation_interval: Duration::from_secs(5),
        }
    }

    fn open_account(
        &self,
        identity: &AccountIdentity,
    ) -> Result<acme_lib::Account<EphemeralPersist>> {
        let persist = EphemeralPersist::new();
        persist.seed_account_key(&identity.email, identity.private_key.as_bytes())?;

        let directory =
            Directory::from_url(persist, DirectoryUrl::Other(&self.directory_url))
                .map_err(|e: AcmeError| anyhow!(e.to_string()))?;

        // acme-lib posts newAccount with the seeded key: an existing account is
        // returned as-is, otherwise one is registered.
        if identity.registered {
            info!("[acme] resolving existing account for {}", identity.email);
        } else {
            info!("[acme] registering new account for {}", identity.email);
        }
        directory
            .account_with_realm(
                &identity.email,
                Some(vec![format!("mailto:{}", identity.email)]),
            )
            .map_err(|e: AcmeError| anyhow!(e.to_string()))
    }

    /// Publishes challenge records for every pending authorization and
    /// returns the record names to clean up.
    fn present_challenges(&self, auths: &[Auth<EphemeralPersist>]) -> Result<Vec<String>> {
        let mut published = Vec::new();
        for auth in auths.iter().filter(|auth| auth.need_challenge()) {
            let proof = auth.dns_challenge().dns_proof();
            let name = record_name(auth.domain_name());
            info!(
                "[acme] publishing DNS-01 record {} via {}",
                name,
                self.publisher.name()
            );
            if let Err(err) = self.publisher.create_txt(&name, &proof) {
                self.cleanup(&published);
                return Err(err);
            }
            published.push(name);
        }
        Ok(published)
    }

    fn await_propagation(&self, auths: &[Auth<EphemeralPersist>]) -> Result<()> {
        for auth in auths.iter().filter(|auth| auth.need_challenge()) {
            let proof = auth.dns_challenge().dns_proof();
            let name = record_name(auth.domain_name());
            let result = poll_dns_propagation(
                &name,
                &proof,
                self.propagation_timeout,
                self.propagation_interval,
            )?;
            if result.state != PropagationState::Found {
                return Err(anyhow!(
                    "TXT record {} not visible after {}s: {}",
                    name,
                    self.propagation_timeout.as_secs(),
                    result.reason.unwrap_or_else(|| format!("{:?}", result.state))
                ));
            }
        }
        Ok(())
    }

    fn cleanup(&self, record_names: &[String]) {
        for name in record_names {
            if let Err(err) = self.publisher.cleanup_txt(name) {
                warn!("[acme] failed to clean up challenge record {}: {}", name, err);
            }
        }
    }

    fn finalize(mut order: NewOrder<EphemeralPersist>, private_key_pem: &str) -> Result<String> {
        let csr_order = loop {
            if let Some(csr) = order.confirm_validations() {
                break csr;
            }
            order.refresh().map_err(|e| anyhow!(e.to_string()))?;
        };
        let cert_order = csr_order
            .finalize(private_key_pem, FINALIZE_DELAY_MS)
            .map_err(|e| anyhow!(e.to_string()))?;
        let certificate = cert_order
            .download_and_save_cert()
            .map_err(|e| anyhow!(e.to_string()))?;
        Ok(certificate.certificate().to_string())
    }

    /// Runs one order to completion and returns the PEM chain.
    fn obtain_chain(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
        private_key_pem: &str,
    ) -> Result<String> {
        let account = self.open_account(identity)?;
        let (primary, alt_names) = hostnames
            .split_first()
            .ok_or_else(|| anyhow!("at least one hostname is required"))?;
        let alt_names: Vec<&str> = alt_names.iter().map(String::as_str).collect();

        let order = account
            .new_order(primary, &alt_names)
            .map_err(|e: AcmeError| anyhow!(e.to_string()))?;
        let auths = order
            .authorizations()
            .map_err(|e: AcmeError| anyhow!(e.to_string()))?;

        let published = self.present_challenges(&auths)?;
        let result = (|| -> Result<String> {
            self.await_propagation(&auths)?;
            for auth in auths.iter().filter(|auth| auth.need_challenge()) {
                auth.dns_challenge()
                    .validate(CHALLENGE_VALIDATE_DELAY_MS)
                    .map_err(|e| anyhow!(e.to_string()))?;
            }
            Self::finalize(order, private_key_pem)
        })();
        self.cleanup(&published);
        result
    }

    fn build_record(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
        private_key: String,
    ) -> Result<CertificateRecord, AuthorityError> {
        if identity.email.trim().is_empty() {
            return Err(AuthorityError::InvalidConfig(
                "account email is required".into(),
            ));
        }
        let chain = self
            .obtain_chain(identity, hostnames, &private_key)
            .map_err(|err| AuthorityError::from_acme_message(err.to_string()))?;
        verify_chain_covers(&chain, hostnames)?;

        Ok(CertificateRecord {
            private_key,
            certificate_chain: chain,
            account: identity.clone(),
            hostnames: hostnames.to_vec(),
        })
    }
}

/// The issued leaf must name exactly the requested hostnames.
pub fn verify_chain_covers(chain_pem: &str, hostnames: &[String]) -> Result<(), AuthorityError> {
    let info = inspect_certificate(chain_pem)
        .map_err(|err| AuthorityError::Operation(format!("issued certificate unreadable: {err}")))?;
    if !hostnames_match(&info.sans, hostnames) {
        return Err(AuthorityError::Operation(format!(
            "issued certificate covers {:?}, requested {:?}",
            info.sans, hostnames
        )));
    }
    Ok(())
}

impl CertificateAuthority for AcmeAuthority {
    fn issue(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
    ) -> Result<CertificateRecord, AuthorityError> {
        let key = generate_certificate_key_pem()
            .map_err(|err| AuthorityError::Operation(err.to_string()))?;
        info!("[acme] requesting new certificate for {:?}", hostnames);
        self.build_record(identity, hostnames, key)
    }

    fn renew(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
        existing_private_key: &str,
    ) -> Result<CertificateRecord, AuthorityError> {
        let key = match self.key_policy {
            KeyPolicy::Reuse => existing_private_key.to_string(),
            KeyPolicy::Rotate => generate_certificate_key_pem()
                .map_err(|err| AuthorityError::Operation(err.to_string()))?,
        };
        info!(
            "[acme] renewing certificate for {:?} (key policy {:?})",
            hostnames, self.key_policy
        );
        self.build_record(identity, hostnames, key)
    }
}
