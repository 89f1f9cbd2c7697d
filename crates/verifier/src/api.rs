//! HTTP API for checks, node audits, health and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use verifier_lib::observability::checkers;
use verifier_lib::{
    compute_available, evaluate_over_quota, evaluate_placement, node_audit, node_available,
    AuditOptions, CoreUseTally, InventoryError, NodeInventory, PlacementStrategy, PodSummary,
    ResourceAmounts, StructuredLogger, Verdict, VerifierMetrics,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// `None` until a Kubernetes client could be built
    pub inventory: Option<Arc<dyn NodeInventory>>,
    pub metrics: VerifierMetrics,
    pub logger: StructuredLogger,
    pub audit_defaults: AuditOptions,
}

impl AppState {
    pub fn new(
        inventory: Option<Arc<dyn NodeInventory>>,
        metrics: VerifierMetrics,
        logger: StructuredLogger,
        audit_defaults: AuditOptions,
    ) -> Self {
        Self {
            inventory,
            metrics,
            logger,
            audit_defaults,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors surfaced by inventory-backed endpoints
#[derive(Debug)]
pub enum ApiError {
    InventoryUnavailable,
    Inventory(InventoryError),
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        ApiError::Inventory(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match &self {
            ApiError::InventoryUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "inventory_unavailable",
                "Kubernetes inventory is not configured".to_string(),
            ),
            ApiError::Inventory(InventoryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            ApiError::Inventory(_) => (
                StatusCode::BAD_GATEWAY,
                "inventory_error",
                self.to_string(),
            ),
        };
        let body = ErrorResponse {
            error,
            code: Some(code.to_string()),
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InventoryUnavailable => write!(f, "inventory unavailable"),
            ApiError::Inventory(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub inventory: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementCheckRequest {
    pub cpu_ids: Vec<u32>,
    pub physical_core_count: u32,
    pub strategy: PlacementStrategy,
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverQuotaCheckRequest {
    pub tally: CoreUseTally,
    pub total_physical_cores: u32,
    pub over_quota_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub passed: bool,
    pub verdict: Verdict,
}

impl From<Verdict> for CheckResponse {
    fn from(verdict: Verdict) -> Self {
        Self {
            passed: verdict.is_pass(),
            verdict,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableRequest {
    pub allocatable: ResourceAmounts,
    #[serde(default)]
    pub pods: Vec<PodSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAvailableResponse {
    pub node: String,
    pub available: ResourceAmounts,
    pub overcommitted: bool,
}

/// Query overrides for a node audit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub ratio: Option<f64>,
    pub physical_cores: Option<u32>,
    pub skip_strategy: Option<bool>,
}

impl AuditQuery {
    fn apply(&self, defaults: &AuditOptions) -> AuditOptions {
        AuditOptions {
            physical_core_count: self.physical_cores.or(defaults.physical_core_count),
            over_quota_ratio: self.ratio.unwrap_or(defaults.over_quota_ratio),
            skip_strategy: self.skip_strategy.unwrap_or(defaults.skip_strategy),
            threads_per_core: defaults.threads_per_core,
        }
    }
}

fn inventory(state: &AppState) -> Result<&dyn NodeInventory, ApiError> {
    state
        .inventory
        .as_deref()
        .ok_or(ApiError::InventoryUnavailable)
}

/// Liveness: serving requests is enough; a missing inventory is reported as degraded
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, inventory) = match state.inventory {
        Some(_) => ("healthy", "connected"),
        None => ("degraded", "unavailable"),
    };
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            inventory: inventory.to_string(),
        }),
    )
}

/// Readiness: ready once the inventory client exists
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.inventory.is_some() {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                reason: None,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                reason: Some("Kubernetes inventory not initialized".to_string()),
            }),
        )
    }
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn check_placement(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlacementCheckRequest>,
) -> Json<CheckResponse> {
    let verdict = evaluate_placement(
        &request.cpu_ids,
        request.physical_core_count,
        &request.strategy,
        request.skip,
    );
    state.metrics.record_check(checkers::PLACEMENT, &verdict);
    Json(verdict.into())
}

async fn check_over_quota(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OverQuotaCheckRequest>,
) -> Json<CheckResponse> {
    let verdict = evaluate_over_quota(
        &request.tally,
        request.total_physical_cores,
        request.over_quota_ratio,
    );
    state.metrics.record_check(checkers::OVER_QUOTA, &verdict);
    Json(verdict.into())
}

/// Accounting over a posted snapshot; touches no inventory
async fn available(Json(request): Json<AvailableRequest>) -> Json<ResourceAmounts> {
    Json(compute_available(request.allocatable, &request.pods))
}

async fn get_node_available(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
) -> Result<Json<NodeAvailableResponse>, ApiError> {
    let available = node_available(inventory(&state)?, &node)
        .await
        .map_err(|err| {
            state.metrics.inc_inventory_errors();
            err
        })?;

    Ok(Json(NodeAvailableResponse {
        node,
        overcommitted: available.is_overcommitted(),
        available,
    }))
}

async fn get_node_audit(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<verifier_lib::NodeAuditReport>, ApiError> {
    let options = query.apply(&state.audit_defaults);
    let started = Instant::now();

    let report = node_audit(inventory(&state)?, &node, &options)
        .await
        .map_err(|err| {
            state.metrics.inc_inventory_errors();
            err
        })?;

    state
        .metrics
        .observe_audit_latency(started.elapsed().as_secs_f64());
    state.metrics.record_audit(&report);
    state.logger.log_audit(&report);

    Ok(Json(report))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/check/placement", post(check_placement))
        .route("/api/v1/check/over-quota", post(check_over_quota))
        .route("/api/v1/available", post(available))
        .route("/api/v1/nodes/:node/available", get(get_node_available))
        .route("/api/v1/nodes/:node/audit", get(get_node_audit))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
