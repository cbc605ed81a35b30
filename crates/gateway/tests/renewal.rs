//! Renewal coordinator behaviour against an in-process backend.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::json;

use common::{Backend, RefreshMode, gateway, spawn_backend, store_with, stored};
use gateway_client::{RenewalFailure, RenewalOutcome};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_observe_the_same_outcome() {
    let backend = Arc::new(
        Backend::new(RefreshMode::Rotate("rt-2")).with_refresh_delay(Duration::from_millis(100)),
    );
    let base = spawn_backend(backend.clone()).await;
    let store = store_with("rt-1");
    let gateway = gateway(&base, store.clone());
    let renewal = gateway.renewal().clone();

    let outcomes = join_all((0..5).map(|_| {
        let renewal = renewal.clone();
        tokio::spawn(async move { renewal.renew().await })
    }))
    .await;

    for outcome in outcomes {
        match outcome.unwrap() {
            RenewalOutcome::Renewed { rotated } => {
                assert_eq!(rotated.unwrap().expose(), "rt-2");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(renewal.epoch(), 1);
    assert_eq!(stored(store.as_ref()).await.as_deref(), Some("rt-2"));
}

#[tokio::test]
async fn latch_is_released_for_the_next_burst() {
    let backend = Arc::new(Backend::new(RefreshMode::Plain));
    let base = spawn_backend(backend.clone()).await;
    let gateway = gateway(&base, store_with("rt-1"));

    assert!(gateway.renewal().renew().await.is_success());
    assert!(!gateway.renewal().is_renewing());
    assert!(gateway.renewal().renew().await.is_success());

    assert_eq!(backend.refresh_calls(), 2);
    assert_eq!(gateway.renewal().epoch(), 2);
}

#[tokio::test]
async fn rejected_renewal_clears_credential() {
    let backend = Arc::new(Backend::new(RefreshMode::Reject));
    let base = spawn_backend(backend.clone()).await;
    let store = store_with("rt-1");
    let gateway = gateway(&base, store.clone());

    let outcome = gateway.renewal().renew().await;
    assert_eq!(outcome, RenewalOutcome::Failed(RenewalFailure::Rejected(401)));
    assert!(stored(store.as_ref()).await.is_none());

    // Nothing left to renew with: the next attempt stays local.
    let outcome = gateway.renewal().renew().await;
    assert_eq!(outcome, RenewalOutcome::Failed(RenewalFailure::MissingCredential));
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn transport_failure_clears_credential() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = store_with("rt-1");
    let gateway = gateway(&format!("http://{addr}"), store.clone());

    let outcome = gateway.renewal().renew().await;
    assert!(matches!(
        outcome,
        RenewalOutcome::Failed(RenewalFailure::Transport(_))
    ));
    assert!(stored(store.as_ref()).await.is_none());
    assert!(!gateway.renewal().is_renewing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logout_during_renewal_is_not_undone() {
    let backend = Arc::new(
        Backend::new(RefreshMode::Rotate("rt-2")).with_refresh_delay(Duration::from_millis(200)),
    );
    let base = spawn_backend(backend.clone()).await;
    let store = store_with("rt-1");
    let gateway = gateway(&base, store.clone());

    let renewal = gateway.renewal().clone();
    let running = tokio::spawn(async move { renewal.renew().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(gateway.renewal().is_renewing());

    gateway.logout().await;
    assert!(stored(store.as_ref()).await.is_none());

    let outcome = running.await.unwrap();
    assert_eq!(outcome, RenewalOutcome::Failed(RenewalFailure::Superseded));
    assert!(stored(store.as_ref()).await.is_none());
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(gateway.renewal().epoch(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_renewal_keeps_credential_from_newer_login() {
    let backend = Arc::new(
        Backend::new(RefreshMode::Reject).with_refresh_delay(Duration::from_millis(200)),
    );
    let base = spawn_backend(backend.clone()).await;
    let store = store_with("rt-stale");
    let gateway = gateway(&base, store.clone());

    let renewal = gateway.renewal().clone();
    let running = tokio::spawn(async move { renewal.renew().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(gateway.renewal().is_renewing());

    gateway
        .login(json!({"username": "ada", "password": "secret"}))
        .await
        .unwrap();
    assert_eq!(stored(store.as_ref()).await.as_deref(), Some("rt-login"));

    let outcome = running.await.unwrap();
    assert_eq!(outcome, RenewalOutcome::Failed(RenewalFailure::Rejected(401)));
    assert_eq!(stored(store.as_ref()).await.as_deref(), Some("rt-login"));
}
