//! HTTP probe behaviour against live mock backends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use service_discovery::health::{BodyExpectation, HealthProbe, HttpProbe, ProbeError, ProbeTarget};
use service_discovery::registry::ServiceKey;
use url::Url;

mod common;
use common::MockResponse;

fn target(addr: std::net::SocketAddr) -> ProbeTarget {
    ProbeTarget {
        key: ServiceKey::new("orders", "default"),
        url: Url::parse(&format!("http://{addr}/health")).unwrap(),
        method: "GET".into(),
        headers: BTreeMap::new(),
        expected_status: vec![200],
        expected_body: None,
        timeout: Duration::from_millis(500),
    }
}

fn expect(value: serde_json::Value) -> Option<BodyExpectation> {
    Some(serde_json::from_value(value).unwrap())
}

#[tokio::test]
async fn healthy_backend_succeeds() {
    let addr = common::start_mock_backend(MockResponse::json(200, json!({"status": "ok"}))).await;
    let probe = HttpProbe::new().unwrap();

    let outcome = probe.probe(&target(addr)).await;
    assert_eq!(outcome.result, Ok(200));
    assert!(outcome.elapsed_ms >= 0.0);
}

#[tokio::test]
async fn unexpected_status_fails() {
    let addr = common::start_mock_backend(MockResponse::text(503, "down")).await;
    let probe = HttpProbe::new().unwrap();

    let outcome = probe.probe(&target(addr)).await;
    assert_eq!(
        outcome.result,
        Err(ProbeError::StatusMismatch {
            actual: 503,
            expected: vec![200]
        })
    );
}

#[tokio::test]
async fn accepts_any_expected_status() {
    let addr = common::start_mock_backend(MockResponse::text(204, "")).await;
    let probe = HttpProbe::new().unwrap();
    let mut target = target(addr);
    target.expected_status = vec![200, 204];

    assert!(probe.probe(&target).await.is_success());
}

#[tokio::test]
async fn partial_body_match_ignores_extra_fields() {
    let addr = common::start_mock_backend(MockResponse::json(
        200,
        json!({"status": "ok", "checks": {"db": "up", "cache": "up"}, "uptime": 12}),
    ))
    .await;
    let probe = HttpProbe::new().unwrap();
    let mut target = target(addr);
    target.expected_body = expect(json!({"status": "ok", "checks": {"db": "up"}}));

    assert!(probe.probe(&target).await.is_success());
}

#[tokio::test]
async fn body_mismatch_fails() {
    let addr = common::start_mock_backend(MockResponse::json(
        200,
        json!({"status": "degraded", "checks": {"db": "down"}}),
    ))
    .await;
    let probe = HttpProbe::new().unwrap();
    let mut target = target(addr);
    target.expected_body = expect(json!({"checks": {"db": "up"}}));

    let outcome = probe.probe(&target).await;
    match outcome.error() {
        Some(ProbeError::BodyMismatch(mismatch)) => assert_eq!(mismatch.field, "checks.db"),
        other => panic!("expected body mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_fails_when_predicate_required() {
    let addr = common::start_mock_backend(MockResponse::text(200, "<html>ok</html>")).await;
    let probe = HttpProbe::new().unwrap();
    let mut target = target(addr);

    assert!(probe.probe(&target).await.is_success());

    target.expected_body = expect(json!({"status": "ok"}));
    assert!(matches!(
        probe.probe(&target).await.error(),
        Some(ProbeError::MalformedBody(_))
    ));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let addr = common::start_mock_backend(
        MockResponse::json(200, json!({})).delayed(Duration::from_secs(2)),
    )
    .await;
    let probe = HttpProbe::new().unwrap();
    let mut target = target(addr);
    target.timeout = Duration::from_millis(100);

    let outcome = probe.probe(&target).await;
    assert_eq!(outcome.result, Err(ProbeError::Timeout(100)));
    assert!(outcome.elapsed_ms < 1_000.0);
}

#[tokio::test]
async fn refused_connection_fails() {
    let addr = common::closed_port().await;
    let probe = HttpProbe::new().unwrap();

    let outcome = probe.probe(&target(addr)).await;
    assert!(matches!(outcome.error(), Some(ProbeError::Connection(_))));
}

#[tokio::test]
async fn sends_method_path_and_headers() {
    let seen = Arc::new(Mutex::new(String::new()));
    let captured = seen.clone();
    let addr = common::start_programmable_backend(move |head| {
        *captured.lock().unwrap() = head;
        async { MockResponse::text(200, "") }
    })
    .await;

    let probe = HttpProbe::new().unwrap();
    let mut target = target(addr);
    target.method = "HEAD".into();
    target.headers.insert("x-probe-token".into(), "abc".into());
    assert!(probe.probe(&target).await.is_success());

    let head = seen.lock().unwrap().to_lowercase();
    assert!(head.starts_with("head /health http/1.1"));
    assert!(head.contains("x-probe-token: abc"));
    assert!(head.contains("user-agent: service-discovery-health/"));
}
