use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{Duration, TimeZone, Utc};

use autocert::core::certificate::inspect_certificate;
use autocert::issuance::AuthorityError;
use autocert::lifecycle::{LifecycleError, LifecycleOrchestrator, RenewalPolicy};
use autocert::secrets::MemorySecretStore;

use super::test_utils::{
    AuthorityCall, EMAIL, FakeAuthority, FakeTarget, hostnames, hours_before_expiry,
    store_with, stored_record, targets,
};

#[test]
fn first_run_issues_and_dispatches_to_every_target() -> Result<()> {
    let store = Arc::new(MemorySecretStore::new());
    let authority = FakeAuthority::new();
    let bunny = FakeTarget::new("bunnycdn", &store);
    let stackpath = FakeTarget::new("stackpath", &store);
    let requested = hostnames(&["a.example.com"]);

    let orchestrator =
        LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&bunny, &stackpath]))
            .with_clock(hours_before_expiry(2000));
    let report = orchestrator.run(EMAIL, &requested, false)?;

    assert_eq!((report.attempted, report.succeeded, report.failed), (2, 2, 0));
    assert_eq!(store.writes(), 1);
    let stored = store.current().ok_or_else(|| anyhow!("record was not created"))?;
    assert_eq!(stored.hostnames, requested);
    assert_eq!(stored.account.email, EMAIL);

    match authority.calls().as_slice() {
        [AuthorityCall::Issue { registered, account_key, .. }] => {
            assert!(!registered);
            assert_eq!(account_key, &stored.account.private_key);
        }
        other => return Err(anyhow!("unexpected authority calls: {other:?}")),
    }
    assert_eq!(bunny.received.lock().unwrap().as_slice(), &[requested.clone()]);
    assert_eq!(stackpath.exec_count(), 1);
    Ok(())
}

#[test]
fn valid_certificate_is_left_alone() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let original = stored_record(&requested)?;
    let store = store_with(&original)?;
    let authority = FakeAuthority::new();
    let target = FakeTarget::new("bunnycdn", &store);

    let report = LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(200))
        .run(EMAIL, &requested, false)?;

    assert_eq!(report.attempted, 0);
    assert!(authority.calls().is_empty());
    assert_eq!(store.writes(), 0);
    assert_eq!(target.exec_count(), 0);
    assert_eq!(store.current(), Some(original));
    Ok(())
}

#[test]
fn expiring_certificate_is_renewed_with_the_stored_key() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let original = stored_record(&requested)?;
    let store = store_with(&original)?;
    let authority = FakeAuthority::new();
    let target = FakeTarget::new("bunnycdn", &store);

    let report = LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(48))
        .run(EMAIL, &requested, false)?;

    assert_eq!((report.attempted, report.succeeded), (1, 1));
    assert_eq!(
        authority.calls(),
        vec![AuthorityCall::Renew {
            existing_key: original.private_key.clone(),
            hostnames: requested.clone(),
        }]
    );
    assert_eq!(store.writes(), 1);

    let renewed = store.current().ok_or_else(|| anyhow!("record vanished"))?;
    assert_eq!(renewed.private_key, original.private_key);
    assert_eq!(renewed.account.private_key, original.account.private_key);
    assert_ne!(renewed.certificate_chain, original.certificate_chain);
    let info = inspect_certificate(&renewed.certificate_chain)?;
    assert_eq!(info.not_after, Utc.with_ymd_and_hms(2031, 7, 1, 0, 0, 0).unwrap());
    Ok(())
}

#[test]
fn expired_certificate_takes_the_renewal_path() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let store = store_with(&stored_record(&requested)?)?;
    let authority = FakeAuthority::new();

    LifecycleOrchestrator::new(store.clone(), authority.clone(), Vec::new())
        .with_clock(hours_before_expiry(-240))
        .run(EMAIL, &requested, false)?;

    assert!(matches!(authority.calls().as_slice(), [AuthorityCall::Renew { .. }]));
    assert_eq!(store.writes(), 1);
    Ok(())
}

#[test]
fn force_renew_ignores_remaining_validity() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let store = store_with(&stored_record(&requested)?)?;
    let authority = FakeAuthority::new();
    let target = FakeTarget::new("stackpath", &store);

    let report = LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(1500))
        .run(EMAIL, &requested, true)?;

    assert_eq!(report.succeeded, 1);
    assert!(matches!(authority.calls().as_slice(), [AuthorityCall::Renew { .. }]));
    assert_eq!(store.writes(), 1);
    Ok(())
}

#[test]
fn custom_window_moves_the_renewal_point() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let store = store_with(&stored_record(&requested)?)?;
    let authority = FakeAuthority::new();

    LifecycleOrchestrator::new(store.clone(), authority.clone(), Vec::new())
        .with_policy(RenewalPolicy::new(Duration::days(30)))
        .with_clock(hours_before_expiry(200))
        .run(EMAIL, &requested, false)?;

    assert_eq!(authority.calls().len(), 1);
    Ok(())
}

#[test]
fn one_failing_target_does_not_fail_the_run() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let original = stored_record(&requested)?;
    let store = store_with(&original)?;
    let authority = FakeAuthority::new();
    let healthy = FakeTarget::new("bunnycdn", &store);
    let broken = FakeTarget::failing("stackpath", &store, "a.example.com");

    let report = LifecycleOrchestrator::new(store.clone(), authority, targets(&[&healthy, &broken]))
        .with_clock(hours_before_expiry(48))
        .run(EMAIL, &requested, false)?;

    assert_eq!((report.attempted, report.succeeded, report.failed), (2, 1, 1));
    let failed: Vec<_> = report.failures().map(|outcome| outcome.target.clone()).collect();
    assert_eq!(failed, vec!["stackpath"]);

    // Both targets already saw the renewed record in the store.
    let renewed = store.current().ok_or_else(|| anyhow!("record vanished"))?;
    assert_ne!(renewed.certificate_chain, original.certificate_chain);
    for target in [&healthy, &broken] {
        assert_eq!(
            target.stored_chain_at_exec.lock().unwrap().as_slice(),
            &[Some(renewed.certificate_chain.clone())]
        );
    }
    Ok(())
}

#[test]
fn stored_hostnames_match_in_any_order() -> Result<()> {
    let store = store_with(&stored_record(&hostnames(&["b.example.com", "a.example.com"]))?)?;
    let authority = FakeAuthority::new();

    let report = LifecycleOrchestrator::new(store.clone(), authority.clone(), Vec::new())
        .with_clock(hours_before_expiry(200))
        .run(EMAIL, &hostnames(&["A.example.com", "b.example.com", "a.example.com"]), false)?;

    assert_eq!(report.attempted, 0);
    assert!(authority.calls().is_empty());
    Ok(())
}

#[test]
fn different_hostnames_trigger_issue_with_the_stored_account() -> Result<()> {
    let original = stored_record(&hostnames(&["a.example.com"]))?;
    let store = store_with(&original)?;
    let authority = FakeAuthority::new();
    let target = FakeTarget::new("bunnycdn", &store);
    let requested = hostnames(&["a.example.com", "b.example.com"]);

    let report = LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(1000))
        .run(EMAIL, &requested, false)?;

    assert_eq!(report.succeeded, 1);
    assert_eq!(
        authority.calls(),
        vec![AuthorityCall::Issue {
            email: EMAIL.to_string(),
            account_key: original.account.private_key.clone(),
            registered: true,
            hostnames: requested.clone(),
        }]
    );
    let stored = store.current().ok_or_else(|| anyhow!("record vanished"))?;
    assert_eq!(stored.hostnames, requested);
    assert_ne!(stored.private_key, original.private_key);
    assert_eq!(store.writes(), 1);
    Ok(())
}

#[test]
fn unparsable_stored_certificate_is_fatal() -> Result<()> {
    let mut record = stored_record(&hostnames(&["a.example.com"]))?;
    record.certificate_chain = "-----BEGIN CERTIFICATE-----\nbm90IGEgY2VydA==\n-----END CERTIFICATE-----\n".into();
    let store = store_with(&record)?;
    let authority = FakeAuthority::new();
    let target = FakeTarget::new("bunnycdn", &store);

    let result = LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(48))
        .run(EMAIL, &hostnames(&["a.example.com"]), true);

    assert!(matches!(result, Err(LifecycleError::MalformedRecord(_))));
    assert!(authority.calls().is_empty());
    assert_eq!(store.writes(), 0);
    assert_eq!(target.exec_count(), 0);
    Ok(())
}

#[test]
fn invalid_stored_account_key_is_fatal() -> Result<()> {
    let mut record = stored_record(&hostnames(&["a.example.com"]))?;
    record.account.private_key = "not a key".into();
    let store = store_with(&record)?;
    let authority = FakeAuthority::new();

    let result = LifecycleOrchestrator::new(store.clone(), authority.clone(), Vec::new())
        .with_clock(hours_before_expiry(48))
        .run(EMAIL, &hostnames(&["a.example.com"]), false);

    assert!(matches!(result, Err(LifecycleError::MalformedRecord(_))));
    assert!(authority.calls().is_empty());
    Ok(())
}

#[test]
fn renewal_failure_keeps_the_previous_record() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let original = stored_record(&requested)?;
    let store = store_with(&original)?;
    let authority = FakeAuthority::failing("urn:ietf:params:acme:error:unauthorized");
    let target = FakeTarget::new("bunnycdn", &store);

    let result = LifecycleOrchestrator::new(store.clone(), authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(48))
        .run(EMAIL, &requested, false);

    assert!(matches!(
        result,
        Err(LifecycleError::Authority(AuthorityError::Operation(_)))
    ));
    assert_eq!(authority.calls().len(), 1);
    assert_eq!(store.writes(), 0);
    assert_eq!(store.current(), Some(original));
    assert_eq!(target.exec_count(), 0);
    Ok(())
}

#[test]
fn second_run_after_renewal_is_a_no_op() -> Result<()> {
    let requested = hostnames(&["a.example.com"]);
    let store = store_with(&stored_record(&requested)?)?;
    let authority = FakeAuthority::new();
    let orchestrator = LifecycleOrchestrator::new(store.clone(), authority.clone(), Vec::new())
        .with_clock(hours_before_expiry(48));

    orchestrator.run(EMAIL, &requested, false)?;
    let report = orchestrator.run(EMAIL, &requested, false)?;

    assert_eq!(report.attempted, 0);
    assert_eq!(authority.calls().len(), 1);
    assert_eq!(store.writes(), 1);
    Ok(())
}
