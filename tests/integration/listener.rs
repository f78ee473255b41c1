use std::sync::Arc;

use anyhow::Result;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use autocert::lifecycle::LifecycleOrchestrator;
use autocert::listener::{RunRequest, router};

use super::test_utils::{
    EMAIL, FakeAuthority, FakeTarget, hostnames, hours_before_expiry, store_with, stored_record,
    targets,
};

fn request(force_renew: bool) -> RunRequest {
    RunRequest {
        email: EMAIL.to_string(),
        hostnames: hostnames(&["a.example.com"]),
        force_renew,
    }
}

async fn call(app: axum::Router, uri: &str) -> Result<(StatusCode, Value)> {
    let response = app
        .oneshot(Request::builder().method("POST").uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), 1024 * 1024).await?;
    Ok((status, serde_json::from_slice(&body)?))
}

#[tokio::test]
async fn trigger_with_valid_certificate_reports_nothing_attempted() -> Result<()> {
    let store = store_with(&stored_record(&hostnames(&["a.example.com"]))?)?;
    let authority = FakeAuthority::new();
    let orchestrator = LifecycleOrchestrator::new(store, authority.clone(), Vec::new())
        .with_clock(hours_before_expiry(500));

    let (status, body) = call(router(Arc::new(orchestrator), request(false)), "/cert").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempted"], 0);
    assert!(authority.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn force_query_parameter_overrides_the_default() -> Result<()> {
    let store = store_with(&stored_record(&hostnames(&["a.example.com"]))?)?;
    let authority = FakeAuthority::new();
    let target = FakeTarget::new("bunnycdn", &store);
    let orchestrator = LifecycleOrchestrator::new(store, authority.clone(), targets(&[&target]))
        .with_clock(hours_before_expiry(500));

    let (status, body) =
        call(router(Arc::new(orchestrator), request(false)), "/cert?force=true").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(authority.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn partial_failure_answers_multi_status() -> Result<()> {
    let store = store_with(&stored_record(&hostnames(&["a.example.com"]))?)?;
    let healthy = FakeTarget::new("bunnycdn", &store);
    let broken = FakeTarget::failing("stackpath", &store, "a.example.com");
    let orchestrator = LifecycleOrchestrator::new(
        store.clone(),
        FakeAuthority::new(),
        targets(&[&healthy, &broken]),
    )
    .with_clock(hours_before_expiry(24));

    let (status, body) = call(router(Arc::new(orchestrator), request(false)), "/cert").await?;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["outcomes"][1]["target"], "stackpath");
    assert_eq!(store.writes(), 1);
    Ok(())
}
