//! One run of the certificate lifecycle: read the stored record, decide
//! between issue, renew and skip, persist, then fan out to the targets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use super::validity::{CertificateState, RenewalPolicy};
use crate::core::certificate::inspect_certificate;
use crate::core::types::{AccountIdentity, CertificateRecord, DispatchReport};
use crate::distribution::{CancellationFlag, DistributionTarget, RunnerFanOut};
use crate::domain::{hostnames_match, normalize_hostnames};
use crate::issuance::authority::{AuthorityError, CertificateAuthority};
use crate::issuance::keys::{generate_account_key_pem, validate_private_key_pem};
use crate::secrets::store::{SecretStore, SecretStoreError};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Errors that abort a run before anything is dispatched.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to read certificate record: {0}")]
    SecretRead(#[source] SecretStoreError),
    #[error("stored certificate record is unusable: {0}")]
    MalformedRecord(String),
    #[error("failed to prepare ACME account: {0}")]
    Account(String),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error("failed to persist certificate record: {0}")]
    SecretWrite(#[source] SecretStoreError),
}

enum Persist {
    Create,
    Update,
}

pub struct LifecycleOrchestrator {
    store: Arc<dyn SecretStore>,
    authority: Arc<dyn CertificateAuthority>,
    targets: Vec<Arc<dyn DistributionTarget>>,
    fanout: RunnerFanOut,
    policy: RenewalPolicy,
    clock: Clock,
}

impl LifecycleOrchestrator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        authority: Arc<dyn CertificateAuthority>,
        targets: Vec<Arc<dyn DistributionTarget>>,
    ) -> Self {
        Self {
            store,
            authority,
            targets,
            fanout: RunnerFanOut::new(CancellationFlag::new()),
            policy: RenewalPolicy::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fanout(mut self, fanout: RunnerFanOut) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Issues, renews or skips for `hostnames`, then distributes whatever
    /// was obtained. A skipped run reports zero attempted targets.
    pub fn run(
        &self,
        email: &str,
        hostnames: &[String],
        force_renew: bool,
    ) -> Result<DispatchReport, LifecycleError> {
        let hostnames = normalize_hostnames(hostnames)
            .map_err(|err| LifecycleError::InvalidRequest(err.to_string()))?;

        let stored = self.store.read().map_err(|err| match err {
            SecretStoreError::Malformed(reason) => LifecycleError::MalformedRecord(reason),
            other => LifecycleError::SecretRead(other),
        })?;

        let (record, persist) = match stored {
            None => {
                info!("[lifecycle] no stored record, issuing for {}", hostnames.join(","));
                let identity = self.fresh_identity(email)?;
                (self.authority.issue(&identity, &hostnames)?, Persist::Create)
            }
            Some(stored) => {
                let identity = stored_identity(&stored, email)?;
                match self.assess(&stored, &hostnames, force_renew)? {
                    state if state.needs_issue() => {
                        (self.authority.issue(&identity, &hostnames)?, Persist::Update)
                    }
                    state if state.needs_renewal() => {
                        info!("[lifecycle] renewing ({:?})", state);
                        let renewed =
                            self.authority
                                .renew(&identity, &hostnames, &stored.private_key)?;
                        (renewed, Persist::Update)
                    }
                    _ => {
                        info!("[lifecycle] certificate still valid, nothing to do");
                        return Ok(DispatchReport::skipped());
                    }
                }
            }
        };

        // The certificate must be stored before any target sees it.
        let saved = match persist {
            Persist::Create => self.store.create(&record),
            Persist::Update => self.store.update(&record),
        };
        saved.map_err(LifecycleError::SecretWrite)?;
        info!("[lifecycle] record saved to {} store", self.store.name());

        Ok(self.fanout.dispatch(&self.targets, &hostnames, &record))
    }

    fn assess(
        &self,
        stored: &CertificateRecord,
        hostnames: &[String],
        force_renew: bool,
    ) -> Result<CertificateState, LifecycleError> {
        let info = inspect_certificate(&stored.certificate_chain)
            .map_err(|err| LifecycleError::MalformedRecord(format!("{err:#}")))?;

        let covered = if stored.hostnames.is_empty() {
            &info.sans
        } else {
            &stored.hostnames
        };
        if !hostnames_match(covered, hostnames) {
            warn!(
                "[lifecycle] stored record covers {} but {} was requested, issuing a new certificate",
                covered.join(","),
                hostnames.join(",")
            );
            return Ok(CertificateState::Absent);
        }

        let now = (self.clock)();
        let state = self.policy.assess(info.not_after, now, force_renew);
        info!(
            "[lifecycle] certificate {} expires {} ({}h left, renewal window {}h)",
            info.serial,
            info.not_after.to_rfc3339(),
            (info.not_after - now).num_hours(),
            self.policy.window().num_hours()
        );
        Ok(state)
    }

    fn fresh_identity(&self, email: &str) -> Result<AccountIdentity, LifecycleError> {
        if email.trim().is_empty() {
            return Err(LifecycleError::InvalidRequest(
                "an account email is required for the first issuance".into(),
            ));
        }
        let key = generate_account_key_pem().map_err(|err| LifecycleError::Account(err.to_string()))?;
        Ok(AccountIdentity::new(email.trim(), key, false))
    }
}

/// The stored account is already registered with the authority; its key is
/// how the authority finds it again.
fn stored_identity(stored: &CertificateRecord, email: &str) -> Result<AccountIdentity, LifecycleError> {
    validate_private_key_pem(&stored.account.private_key)
        .map_err(|err| LifecycleError::MalformedRecord(format!("account key: {err}")))?;
    let email = match email.trim() {
        "" => stored.account.email.clone(),
        requested => requested.to_string(),
    };
    Ok(AccountIdentity::new(
        email,
        stored.account.private_key.clone(),
        true,
    ))
}
