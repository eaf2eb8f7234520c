//! Admin HTTP API against a live router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use service_discovery::admin::{self, AppState};
use service_discovery::config::SchedulerConfig;
use service_discovery::health::{HealthScheduler, HttpProbe};
use service_discovery::registry::ServiceRegistry;
use service_discovery::Shutdown;
use tokio::net::TcpListener;

mod common;
use common::MockResponse;

struct Harness {
    base: String,
    client: reqwest::Client,
    registry: Arc<ServiceRegistry>,
    shutdown: Shutdown,
}

impl Harness {
    async fn start() -> Self {
        let config = SchedulerConfig::default();
        let registry = Arc::new(ServiceRegistry::new(config.breaker_policy()));
        let scheduler =
            HealthScheduler::new(registry.clone(), Arc::new(HttpProbe::new().unwrap()), config);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = admin::setup_admin_router(AppState::new(scheduler), Duration::from_secs(5));
        let shutdown = Shutdown::new();
        tokio::spawn(admin::serve(listener, router, shutdown.subscribe()));

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            registry,
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn register(&self, body: Value) -> reqwest::Response {
        self.client
            .post(self.url("/services"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn service_body(name: &str, addr: SocketAddr, deps: &[&str]) -> Value {
    json!({
        "name": name,
        "host": addr.ip().to_string(),
        "port": addr.port(),
        "dependencies": deps,
        "health_check": { "path": "/health", "expected_response": { "status": "ok" } }
    })
}

#[tokio::test]
async fn register_get_and_unregister() {
    let h = Harness::start().await;
    let backend = common::start_mock_backend(MockResponse::json(200, json!({"status": "ok"}))).await;

    let res = h.register(service_body("orders", backend, &[])).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["key"], "orders:default");
    assert_eq!(created["status"], "unknown");
    assert_eq!(created["circuit_breaker"]["state"], "closed");

    let res = h.client.get(h.url("/services/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = h.client.delete(h.url("/services/orders:default")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = h.client.get(h.url("/services/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "service not found: orders:default");

    let res = h.client.delete(h.url("/services/orders")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_registration_is_bad_request() {
    let h = Harness::start().await;

    let res = h.register(json!({"name": "orders", "host": "", "port": 0})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("host is required"));
    assert!(error.contains("port is required"));
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn malformed_check_header_is_bad_request() {
    let h = Harness::start().await;
    let backend = common::start_mock_backend(MockResponse::json(200, json!({"status": "ok"}))).await;
    let mut body = service_body("orders", backend, &[]);
    body["health_check"]["headers"] = json!({"bad header": "1"});

    let res = h.register(body).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("health_check.headers"));
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn forced_check_and_status_filter() {
    let h = Harness::start().await;
    let up = common::start_mock_backend(MockResponse::json(200, json!({"status": "ok"}))).await;
    let down = common::start_mock_backend(MockResponse::text(500, "boom")).await;
    h.register(service_body("orders", up, &[])).await;
    h.register(service_body("billing", down, &[])).await;

    let res = h
        .client
        .post(h.url("/services/orders/check"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let record: Value = res.json().await.unwrap();
    assert_eq!(record["status"], "healthy");
    assert_eq!(record["metrics"]["total_checks"], 1);

    let record: Value = h
        .client
        .post(h.url("/services/billing/check"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["metrics"]["consecutive_failures"], 1);
    assert!(record["last_error"].as_str().unwrap().contains("500"));

    let healthy: Vec<Value> = h
        .client
        .get(h.url("/services?status=healthy"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(healthy.len(), 1);
    assert_eq!(healthy[0]["name"], "orders");

    let res = h.client.get(h.url("/services?status=down")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = h.client.post(h.url("/services/ghost/check")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dependency_views() {
    let h = Harness::start().await;
    let backend = common::start_mock_backend(MockResponse::json(200, json!({"status": "ok"}))).await;
    h.register(service_body("a", backend, &["b"])).await;
    h.register(service_body("b", backend, &["a", "c"])).await;

    let deps: Value = h
        .client
        .get(h.url("/services/a/dependencies"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deps["dependents"], json!(["b:default"]));
    let b = &deps["tree"]["dependencies"][0];
    assert_eq!(b["service"], "b:default");
    assert_eq!(b["dependencies"][0]["circular"], true);
    assert_eq!(b["dependencies"][1]["service"], "c:default");
    assert_eq!(b["dependencies"][1]["registered"], false);

    let cycles: Value = h
        .client
        .get(h.url("/dependencies/cycles"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cycles["count"], 1);
    assert_eq!(cycles["cycles"][0], json!(["a:default", "b:default", "a:default"]));
}

#[tokio::test]
async fn groups_heartbeat_and_overview() {
    let h = Harness::start().await;
    let backend = common::start_mock_backend(MockResponse::json(200, json!({"status": "ok"}))).await;
    let mut eu = service_body("orders", backend, &[]);
    eu["instance"] = json!("eu");
    let mut us = service_body("orders", backend, &[]);
    us["instance"] = json!("us");
    h.register(eu).await;
    h.register(us).await;

    let group: Vec<Value> = h
        .client
        .get(h.url("/groups/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let instances: Vec<_> = group.iter().map(|r| r["instance"].clone()).collect();
    assert_eq!(instances, vec![json!("eu"), json!("us")]);

    let res = h
        .client
        .post(h.url("/services/orders:eu/heartbeat"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = h
        .client
        .post(h.url("/services/orders:asia/heartbeat"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let overview: Value = h
        .client
        .get(h.url("/overview"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["total_services"], 2);
    assert_eq!(overview["services"]["unknown"], 2);
    assert_eq!(overview["circuit_breakers"]["closed"], 2);

    let status: Value = h
        .client
        .get(h.url("/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["services"], 2);

    h.shutdown.trigger();
}

#[tokio::test]
async fn malformed_key_is_bad_request() {
    let h = Harness::start().await;
    let res = h.client.get(h.url("/services/orders:")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
