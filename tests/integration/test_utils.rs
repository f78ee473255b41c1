use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair, date_time_ymd};

use autocert::core::types::{AccountIdentity, CertificateRecord};
use autocert::distribution::{DistributionError, DistributionTarget};
use autocert::issuance::authority::{AuthorityError, CertificateAuthority};
use autocert::issuance::keys::generate_account_key_pem;
use autocert::lifecycle::Clock;
use autocert::secrets::{MemorySecretStore, SecretStore};

pub const EMAIL: &str = "ops@example.com";

/// Expiry of certificates placed in the store by `stored_record`.
pub fn stored_not_after() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2031, 4, 1, 0, 0, 0).unwrap()
}

/// A clock reading `hours` before the stored certificate expires.
pub fn hours_before_expiry(hours: i64) -> Clock {
    let now = stored_not_after() - Duration::hours(hours);
    Arc::new(move || now)
}

pub fn hostnames(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// CA-signed chain (leaf first) for `names`, valid from 2031-01-01 until the given date.
pub fn certificate_chain(names: &[String], not_after: (i32, u8, u8)) -> Result<String> {
    let mut ca_params = CertificateParams::new(vec!["Test Issuing CA".to_string()])?;
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_key = KeyPair::generate()?;
    let ca = ca_params.self_signed(&ca_key)?;

    let mut leaf_params = CertificateParams::new(names.to_vec())?;
    leaf_params.not_before = date_time_ymd(2031, 1, 1);
    leaf_params.not_after = date_time_ymd(not_after.0, not_after.1, not_after.2);
    let leaf_key = KeyPair::generate()?;
    let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key)?;
    Ok(format!("{}{}", leaf.pem(), ca.pem()))
}

pub fn stored_record(names: &[String]) -> Result<CertificateRecord> {
    Ok(CertificateRecord {
        private_key: KeyPair::generate()?.serialize_pem(),
        certificate_chain: certificate_chain(names, (2031, 4, 1))?,
        account: AccountIdentity::new(EMAIL, generate_account_key_pem()?, false),
        hostnames: names.to_vec(),
    })
}

pub fn store_with(record: &CertificateRecord) -> Result<Arc<MemorySecretStore>> {
    MemorySecretStore::with_record(record)
        .map(Arc::new)
        .map_err(|err| anyhow!("failed to seed store: {err}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    Issue {
        email: String,
        account_key: String,
        registered: bool,
        hostnames: Vec<String>,
    },
    Renew {
        existing_key: String,
        hostnames: Vec<String>,
    },
}

/// Hands out freshly generated certificates valid until 2031-07-01.
#[derive(Default)]
pub struct FakeAuthority {
    pub calls: Mutex<Vec<AuthorityCall>>,
    fail_with: Option<String>,
}

impl FakeAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_with: Some(message.to_string()),
        })
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        self.calls.lock().unwrap().clone()
    }

    fn obtain(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
        private_key: String,
    ) -> Result<CertificateRecord, AuthorityError> {
        if let Some(message) = &self.fail_with {
            return Err(AuthorityError::Operation(message.clone()));
        }
        let chain = certificate_chain(hostnames, (2031, 7, 1))
            .map_err(|err| AuthorityError::Operation(err.to_string()))?;
        Ok(CertificateRecord {
            private_key,
            certificate_chain: chain,
            account: identity.clone(),
            hostnames: hostnames.to_vec(),
        })
    }
}

impl CertificateAuthority for FakeAuthority {
    fn issue(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
    ) -> Result<CertificateRecord, AuthorityError> {
        self.calls.lock().unwrap().push(AuthorityCall::Issue {
            email: identity.email.clone(),
            account_key: identity.private_key.clone(),
            registered: identity.registered,
            hostnames: hostnames.to_vec(),
        });
        let key = KeyPair::generate()
            .map_err(|err| AuthorityError::Operation(err.to_string()))?
            .serialize_pem();
        self.obtain(identity, hostnames, key)
    }

    fn renew(
        &self,
        identity: &AccountIdentity,
        hostnames: &[String],
        existing_private_key: &str,
    ) -> Result<CertificateRecord, AuthorityError> {
        self.calls.lock().unwrap().push(AuthorityCall::Renew {
            existing_key: existing_private_key.to_string(),
            hostnames: hostnames.to_vec(),
        });
        self.obtain(identity, hostnames, existing_private_key.to_string())
    }
}

/// Records every exec together with what the store held at that moment.
pub struct FakeTarget {
    name: String,
    fail_with: Option<String>,
    store: Arc<MemorySecretStore>,
    pub received: Mutex<Vec<Vec<String>>>,
    pub stored_chain_at_exec: Mutex<Vec<Option<String>>>,
}

impl FakeTarget {
    pub fn new(name: &str, store: &Arc<MemorySecretStore>) -> Arc<Self> {
        Self::build(name, store, None)
    }

    pub fn failing(name: &str, store: &Arc<MemorySecretStore>, message: &str) -> Arc<Self> {
        Self::build(name, store, Some(message.to_string()))
    }

    fn build(name: &str, store: &Arc<MemorySecretStore>, fail_with: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail_with,
            store: Arc::clone(store),
            received: Mutex::new(Vec::new()),
            stored_chain_at_exec: Mutex::new(Vec::new()),
        })
    }

    pub fn exec_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl DistributionTarget for FakeTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn exec(
        &self,
        hostnames: &[String],
        _record: &CertificateRecord,
    ) -> Result<Option<String>, DistributionError> {
        self.received.lock().unwrap().push(hostnames.to_vec());
        let stored = self
            .store
            .read()
            .ok()
            .flatten()
            .map(|record| record.certificate_chain);
        self.stored_chain_at_exec.lock().unwrap().push(stored);
        match &self.fail_with {
            Some(message) => Err(DistributionError::UnknownHostname(message.clone())),
            None => Ok(None),
        }
    }
}

pub fn targets(list: &[&Arc<FakeTarget>]) -> Vec<Arc<dyn DistributionTarget>> {
    list.iter()
        .map(|target| Arc::clone(*target) as Arc<dyn DistributionTarget>)
        .collect()
}
