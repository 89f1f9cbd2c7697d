//! Observability infrastructure for the verifier
//!
//! Provides:
//! - Prometheus metrics (check outcomes, audit latency, bound CPUs, inventory errors)
//! - Structured JSON logging with tracing

use crate::audit::NodeAuditReport;
use crate::verdict::Verdict;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for audit latency (in seconds); audits include an API round-trip
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Checker labels
pub mod checkers {
    pub const PLACEMENT: &str = "placement";
    pub const OVER_QUOTA: &str = "over_quota";
}

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<VerifierMetricsInner> = OnceLock::new();

struct VerifierMetricsInner {
    checks_total: IntCounterVec,
    audit_latency_seconds: Histogram,
    bound_cpus: IntGauge,
    inventory_errors: IntCounter,
}

impl VerifierMetricsInner {
    fn new() -> Self {
        Self {
            checks_total: register_int_counter_vec!(
                "cpuset_verifier_checks_total",
                "Checker evaluations by checker and outcome",
                &["checker", "outcome"]
            )
            .expect("Failed to register checks_total"),

            audit_latency_seconds: register_histogram!(
                "cpuset_verifier_audit_latency_seconds",
                "Time spent auditing a node, inventory reads included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register audit_latency_seconds"),

            bound_cpus: register_int_gauge!(
                "cpuset_verifier_bound_cpus",
                "Total cpuset bindings seen in the latest node audit"
            )
            .expect("Failed to register bound_cpus"),

            inventory_errors: register_int_counter!(
                "cpuset_verifier_inventory_errors_total",
                "Failed node or pod inventory reads"
            )
            .expect("Failed to register inventory_errors"),
        }
    }
}

/// Verifier metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct VerifierMetrics {
    _private: (),
}

impl Default for VerifierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifierMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(VerifierMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &VerifierMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Count one checker evaluation
    pub fn record_check(&self, checker: &str, verdict: &Verdict) {
        self.inner()
            .checks_total
            .with_label_values(&[checker, verdict.outcome()])
            .inc();
    }

    pub fn observe_audit_latency(&self, duration_secs: f64) {
        self.inner().audit_latency_seconds.observe(duration_secs);
    }

    /// Record every verdict of an audit and its bound CPU total
    pub fn record_audit(&self, report: &NodeAuditReport) {
        for container in &report.containers {
            self.record_check(checkers::PLACEMENT, &container.verdict);
        }
        self.record_check(checkers::OVER_QUOTA, &report.over_quota);
        self.inner()
            .bound_cpus
            .set(i64::try_from(report.tally.bound_total()).unwrap_or(i64::MAX));
    }

    pub fn inc_inventory_errors(&self) {
        self.inner().inventory_errors.inc();
    }

    pub fn checks_total(&self, checker: &str, outcome: &str) -> u64 {
        self.inner()
            .checks_total
            .with_label_values(&[checker, outcome])
            .get()
    }
}

/// Structured logger for verifier events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, over_quota_ratio: f64) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            over_quota_ratio = over_quota_ratio,
            "Cpuset verifier started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Cpuset verifier shutting down"
        );
    }

    /// Log a container whose cpuset breaks its declared strategy
    pub fn log_placement_violation(
        &self,
        pod: &str,
        container: &str,
        cpu_ids: &[u32],
        verdict: &Verdict,
    ) {
        warn!(
            event = "placement_violation",
            node = %self.node_name,
            pod = %pod,
            container = %container,
            cpu_ids = ?cpu_ids,
            outcome = verdict.outcome(),
            details = %verdict,
            "Cpuset does not match declared strategy"
        );
    }

    pub fn log_over_quota_violation(&self, bound_total: u64, ratio: f64, verdict: &Verdict) {
        warn!(
            event = "over_quota_violation",
            node = %self.node_name,
            bound_total = bound_total,
            over_quota_ratio = ratio,
            details = %verdict,
            "Cpuset bindings exceed over-quota ratio"
        );
    }

    /// Log an audit summary plus one record per violation
    pub fn log_audit(&self, report: &NodeAuditReport) {
        for container in report.violations() {
            self.log_placement_violation(
                &container.pod,
                &container.container,
                &container.cpu_ids,
                &container.verdict,
            );
        }
        if !report.over_quota.is_pass() {
            self.log_over_quota_violation(
                report.tally.bound_total(),
                report.over_quota_ratio,
                &report.over_quota,
            );
        }

        info!(
            event = "node_audited",
            node = %report.node,
            containers = report.containers.len(),
            bound_total = report.tally.bound_total(),
            available_cpu_milli = report.available.cpu_milli,
            available_memory_bytes = report.available.memory_bytes,
            available_ephemeral_storage_bytes = report.available.ephemeral_storage_bytes,
            passed = report.passed,
            "Node audit complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_count_outcomes() {
        let metrics = VerifierMetrics::new();
        let before = metrics.checks_total(checkers::PLACEMENT, "unsupported_strategy");

        metrics.record_check(
            checkers::PLACEMENT,
            &Verdict::UnsupportedStrategy {
                strategy: "random".to_string(),
            },
        );
        metrics.observe_audit_latency(0.02);
        metrics.inc_inventory_errors();

        assert_eq!(
            metrics.checks_total(checkers::PLACEMENT, "unsupported_strategy"),
            before + 1
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name, "test-node");
    }
}
