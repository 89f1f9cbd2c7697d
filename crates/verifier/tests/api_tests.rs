//! Integration tests for the verifier API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cpuset_verifier::api::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;
use verifier_lib::{
    AllocationSpec, AuditOptions, ContainerRequests, InventoryError, NodeInventory, NodeSnapshot,
    PodPhase, PodRecord, PodSummary, ResourceAmounts, StructuredLogger, VerifierMetrics,
};

/// Fixed node and pod list standing in for the API server
struct StaticInventory {
    node: NodeSnapshot,
    pods: Vec<PodRecord>,
}

#[async_trait]
impl NodeInventory for StaticInventory {
    async fn node(&self, name: &str) -> Result<NodeSnapshot, InventoryError> {
        if name == self.node.name {
            Ok(self.node.clone())
        } else {
            Err(InventoryError::NotFound(name.to_string()))
        }
    }

    async fn pods_on_node(&self, _name: &str) -> Result<Vec<PodRecord>, InventoryError> {
        Ok(self.pods.clone())
    }
}

fn pod(name: &str, phase: PodPhase, cpus: i64, strategy: &str, cpu_ids: &[u32]) -> PodRecord {
    let raw = serde_json::json!({
        "containers": [{
            "name": "main",
            "resource": {"cpu": {"cpuset": {"spreadStrategy": strategy, "cpuIDs": cpu_ids}}}
        }]
    })
    .to_string();

    PodRecord {
        namespace: "default".to_string(),
        name: name.to_string(),
        summary: PodSummary {
            phase,
            containers: vec![ContainerRequests {
                name: Some("main".to_string()),
                cpu_milli: Some(cpus * 1000),
                memory_bytes: Some(2 << 30),
                ephemeral_storage_bytes: None,
            }],
        },
        allocation: Some(AllocationSpec::from_json("test", &raw).unwrap()),
        allocation_error: None,
    }
}

fn inventory() -> StaticInventory {
    StaticInventory {
        node: NodeSnapshot {
            name: "worker-1".to_string(),
            allocatable: ResourceAmounts::new(46_000, 64 << 30, 100 << 30),
            logical_cpus: 48,
        },
        pods: vec![
            pod("a", PodPhase::Running, 4, "sameCoreFirst", &[0, 24, 1, 25]),
            pod("b", PodPhase::Running, 2, "spread", &[2, 3]),
            pod("c", PodPhase::Succeeded, 8, "spread", &[4, 5, 6, 7, 8, 9, 10, 11]),
        ],
    }
}

fn setup_test_app(inventory: Option<StaticInventory>) -> Router {
    let inventory = inventory.map(|inv| Arc::new(inv) as Arc<dyn NodeInventory>);
    let state = Arc::new(AppState::new(
        inventory,
        VerifierMetrics::new(),
        StructuredLogger::new("worker-1"),
        AuditOptions::default(),
    ));
    create_router(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_healthz_reports_inventory() {
    let (status, body) = send(setup_test_app(Some(inventory())), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    // Still live without a cluster connection
    let (status, body) = send(setup_test_app(None), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_readyz_requires_inventory() {
    let (status, body) = send(setup_test_app(Some(inventory())), get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, body) = send(setup_test_app(None), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup_test_app(None);
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));
}

#[tokio::test]
async fn test_check_placement_same_core_first() {
    let app = setup_test_app(None);
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/check/placement",
            serde_json::json!({
                "cpu_ids": [0, 24, 1, 25],
                "physical_core_count": 24,
                "strategy": "sameCoreFirst"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["verdict"]["outcome"], "pass");
}

#[tokio::test]
async fn test_check_placement_reports_unsupported_strategy() {
    let app = setup_test_app(None);
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/check/placement",
            serde_json::json!({
                "cpu_ids": [0, 1],
                "physical_core_count": 24,
                "strategy": "random"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], false);
    assert_eq!(body["verdict"]["outcome"], "unsupported_strategy");
    assert_eq!(body["verdict"]["strategy"], "random");
}

#[tokio::test]
async fn test_check_over_quota_aggregate_budget() {
    let within = serde_json::json!({
        "tally": {"0": 2, "1": 2, "2": 2, "3": 2, "4": 1, "5": 1, "6": 1, "7": 1},
        "total_physical_cores": 8,
        "over_quota_ratio": 1.5
    });
    let (_, body) = send(
        setup_test_app(None),
        post_json("/api/v1/check/over-quota", within),
    )
    .await;
    assert_eq!(body["passed"], true);

    let over = serde_json::json!({
        "tally": {"0": 2, "1": 2, "2": 2, "3": 2, "4": 2, "5": 2, "6": 2, "7": 2, "8": 1},
        "total_physical_cores": 8,
        "over_quota_ratio": 1.5
    });
    let (_, body) = send(
        setup_test_app(None),
        post_json("/api/v1/check/over-quota", over),
    )
    .await;
    assert_eq!(body["passed"], false);
    assert_eq!(body["verdict"]["outcome"], "policy_violated");
}

#[tokio::test]
async fn test_check_over_quota_huge_ratio() {
    let request = serde_json::json!({
        "tally": {"0": 1},
        "total_physical_cores": 2,
        "over_quota_ratio": 1e30
    });
    let (status, body) = send(
        setup_test_app(None),
        post_json("/api/v1/check/over-quota", request),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
}

#[tokio::test]
async fn test_available_from_posted_snapshot() {
    let app = setup_test_app(None);
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/available",
            serde_json::json!({
                "allocatable": {
                    "cpu_milli": 4000,
                    "memory_bytes": 1000,
                    "ephemeral_storage_bytes": 500
                },
                "pods": [
                    {"phase": "Running", "containers": [{"cpu_milli": 5000, "memory_bytes": 200}]},
                    {"phase": "Failed", "containers": [{"cpu_milli": 1000}]}
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cpu_milli"], -1000);
    assert_eq!(body["memory_bytes"], 800);
    assert_eq!(body["ephemeral_storage_bytes"], 500);
}

#[tokio::test]
async fn test_malformed_check_body_is_rejected() {
    let app = setup_test_app(None);
    let (status, _) = send(
        app,
        post_json("/api/v1/check/placement", serde_json::json!({"cpu_ids": "zero"})),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_node_available() {
    let app = setup_test_app(Some(inventory()));
    let (status, body) = send(app, get("/api/v1/nodes/worker-1/available")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node"], "worker-1");
    assert_eq!(body["available"]["cpu_milli"], 40_000);
    assert_eq!(body["available"]["memory_bytes"], 60i64 << 30);
    assert_eq!(body["overcommitted"], false);
}

#[tokio::test]
async fn test_node_endpoints_without_inventory() {
    let app = setup_test_app(None);
    let (status, body) = send(app, get("/api/v1/nodes/worker-1/available")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "inventory_unavailable");
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let app = setup_test_app(Some(inventory()));
    let (status, body) = send(app, get("/api/v1/nodes/worker-9/audit")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_node_audit_passes() {
    let app = setup_test_app(Some(inventory()));
    let (status, body) = send(app, get("/api/v1/nodes/worker-1/audit")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["physical_core_count"], 24);
    assert_eq!(body["containers"].as_array().unwrap().len(), 2);
    assert_eq!(body["over_quota"]["outcome"], "pass");
}

#[tokio::test]
async fn test_node_audit_query_overrides() {
    // Every id maps to core 0 when the node is declared single-core.
    let app = setup_test_app(Some(inventory()));
    let (status, body) = send(
        app,
        get("/api/v1/nodes/worker-1/audit?physical_cores=1&skip_strategy=false"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], false);
    assert_eq!(body["physical_core_count"], 1);

    let app = setup_test_app(Some(inventory()));
    let (_, body) = send(
        app,
        get("/api/v1/nodes/worker-1/audit?physical_cores=1&skip_strategy=true"),
    )
    .await;
    assert_eq!(body["passed"], true);
}
