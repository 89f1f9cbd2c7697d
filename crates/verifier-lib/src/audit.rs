//! Node audit
//!
//! Runs the placement and over-quota checkers over every container bound to
//! a node and pairs the outcome with the node's available resources.

use crate::inventory::{NodeSnapshot, PodRecord};
use crate::overquota::evaluate_over_quota;
use crate::resources::{compute_available, ContainerRequests, ResourceAmounts};
use crate::strategy::{evaluate_placement, PlacementStrategy};
use crate::tally::CoreUseTally;
use crate::topology::{physical_cores_from_logical, DEFAULT_THREADS_PER_CORE};
use crate::verdict::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Knobs for a node audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditOptions {
    /// Physical core count; derived from the node's logical CPUs when unset
    #[serde(default)]
    pub physical_core_count: Option<u32>,
    #[serde(default = "default_ratio")]
    pub over_quota_ratio: f64,
    /// Skip strategy checks for mixed or randomized placements
    #[serde(default)]
    pub skip_strategy: bool,
    #[serde(default = "default_threads_per_core")]
    pub threads_per_core: u32,
}

fn default_ratio() -> f64 {
    1.0
}

fn default_threads_per_core() -> u32 {
    DEFAULT_THREADS_PER_CORE
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            physical_core_count: None,
            over_quota_ratio: default_ratio(),
            skip_strategy: false,
            threads_per_core: default_threads_per_core(),
        }
    }
}

/// Placement outcome for one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerAudit {
    pub pod: String,
    pub container: String,
    pub cpu_ids: Vec<u32>,
    pub strategy: PlacementStrategy,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAuditReport {
    pub node: String,
    pub generated_at: DateTime<Utc>,
    pub physical_core_count: u32,
    pub logical_cpus: u32,
    pub over_quota_ratio: f64,
    pub containers: Vec<ContainerAudit>,
    pub tally: CoreUseTally,
    pub over_quota: Verdict,
    pub available: ResourceAmounts,
    pub passed: bool,
}

impl NodeAuditReport {
    pub fn violations(&self) -> impl Iterator<Item = &ContainerAudit> {
        self.containers.iter().filter(|c| !c.verdict.is_pass())
    }
}

/// Cpuset size must match a whole-core CPU request; fractional or missing
/// requests are not cross-checked.
fn request_mismatch(requests: Option<&ContainerRequests>, cpu_ids: &[u32]) -> Option<Verdict> {
    let cpu_milli = requests?.cpu_milli?;
    if cpu_milli <= 0 || cpu_milli % 1000 != 0 {
        return None;
    }
    let whole_cores = cpu_milli / 1000;
    if whole_cores == cpu_ids.len() as i64 {
        return None;
    }
    Some(Verdict::invalid(format!(
        "cpuset holds {} logical cpus but the container requests {}",
        cpu_ids.len(),
        whole_cores
    )))
}

/// Audit one node from already-fetched inventory data.
///
/// Terminal pods are ignored. Cpuset bindings are tallied per CPU id and the
/// tally is checked against the node's logical CPU count. A pod whose
/// allocation spec could not be decoded is reported as invalid input.
pub fn audit_node(
    node: &NodeSnapshot,
    pods: &[PodRecord],
    options: &AuditOptions,
) -> NodeAuditReport {
    let physical_core_count = options.physical_core_count.unwrap_or_else(|| {
        physical_cores_from_logical(node.logical_cpus, options.threads_per_core)
    });

    let mut tally = CoreUseTally::new();
    let mut containers = Vec::new();

    for pod in pods.iter().filter(|pod| !pod.summary.phase.is_terminal()) {
        if let Some(error) = &pod.allocation_error {
            containers.push(ContainerAudit {
                pod: pod.key(),
                container: String::new(),
                cpu_ids: Vec::new(),
                strategy: PlacementStrategy::Unsupported(String::new()),
                verdict: Verdict::invalid(error.clone()),
            });
            continue;
        }
        let Some(spec) = &pod.allocation else {
            continue;
        };
        for container in spec.containers.iter().filter(|c| c.has_cpuset()) {
            let cpu_ids = container.cpu_ids();
            let strategy = container.strategy();
            let verdict = request_mismatch(pod.summary.container(&container.name), &cpu_ids)
                .unwrap_or_else(|| {
                    evaluate_placement(
                        &cpu_ids,
                        physical_core_count,
                        &strategy,
                        options.skip_strategy,
                    )
                });
            tally.record(&cpu_ids);
            containers.push(ContainerAudit {
                pod: pod.key(),
                container: container.name.clone(),
                cpu_ids,
                strategy,
                verdict,
            });
        }
    }

    let over_quota = evaluate_over_quota(&tally, node.logical_cpus, options.over_quota_ratio);
    let available = compute_available(node.allocatable, pods.iter().map(|pod| &pod.summary));
    let passed = over_quota.is_pass() && containers.iter().all(|c| c.verdict.is_pass());

    NodeAuditReport {
        node: node.name.clone(),
        generated_at: Utc::now(),
        physical_core_count,
        logical_cpus: node.logical_cpus,
        over_quota_ratio: options.over_quota_ratio,
        containers,
        tally,
        over_quota,
        available,
        passed,
    }
}

/// One step of a scenario replay against a tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TallyEvent {
    Allocate { cpu_ids: Vec<u32> },
    Release { cpu_ids: Vec<u32> },
}

/// First step whose resulting tally failed the over-quota check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: usize,
    pub verdict: Verdict,
}

/// Replay allocation events into a caller-owned tally, checking the
/// over-quota ratio after every step.
///
/// Stops at the first failing step; the tally then reflects the events up to
/// and including that step.
pub fn verify_container_sequence(
    tally: &mut CoreUseTally,
    events: &[TallyEvent],
    total_cpus: u32,
    over_quota_ratio: f64,
) -> Result<(), StepFailure> {
    for (step, event) in events.iter().enumerate() {
        match event {
            TallyEvent::Allocate { cpu_ids } => tally.record(cpu_ids),
            TallyEvent::Release { cpu_ids } => tally.release(cpu_ids),
        }
        let verdict = evaluate_over_quota(tally, total_cpus, over_quota_ratio);
        if !verdict.is_pass() {
            return Err(StepFailure { step, verdict });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationSpec;
    use crate::resources::{PodPhase, PodSummary};

    fn node(logical_cpus: u32) -> NodeSnapshot {
        NodeSnapshot {
            name: "worker-1".to_string(),
            allocatable: ResourceAmounts::new(i64::from(logical_cpus) * 1000, 64 << 30, 100 << 30),
            logical_cpus,
        }
    }

    fn pod(name: &str, phase: PodPhase, cpus: i64, alloc: &str) -> PodRecord {
        PodRecord {
            namespace: "default".to_string(),
            name: name.to_string(),
            summary: PodSummary {
                phase,
                containers: vec![ContainerRequests {
                    name: Some("main".to_string()),
                    cpu_milli: Some(cpus * 1000),
                    ..Default::default()
                }],
            },
            allocation: Some(AllocationSpec::from_json("test", alloc).unwrap()),
            allocation_error: None,
        }
    }

    fn alloc(strategy: &str, ids: &[u32]) -> String {
        format!(
            r#"{{"containers":[{{"name":"main","resource":{{"cpu":{{"cpuset":{{"spreadStrategy":"{}","cpuIDs":{:?}}}}}}}}}]}}"#,
            strategy, ids
        )
    }

    #[test]
    fn test_audit_passes_compliant_node() {
        let pods = vec![
            pod("a", PodPhase::Running, 4, &alloc("sameCoreFirst", &[0, 24, 1, 25])),
            pod("b", PodPhase::Running, 2, &alloc("spread", &[2, 3])),
        ];
        let report = audit_node(&node(48), &pods, &AuditOptions::default());

        assert_eq!(report.physical_core_count, 24);
        assert!(report.passed, "unexpected failures: {:?}", report.containers);
        assert_eq!(report.tally.bound_total(), 6);
        assert_eq!(report.available.cpu_milli, 42_000);
        assert_eq!(report.violations().count(), 0);
    }

    #[test]
    fn test_audit_flags_placement_violation() {
        let pods = vec![pod("a", PodPhase::Running, 4, &alloc("sameCoreFirst", &[0, 1, 2, 3]))];
        let report = audit_node(&node(48), &pods, &AuditOptions::default());

        assert!(!report.passed);
        assert!(report.over_quota.is_pass());
        let violation = report.violations().next().unwrap();
        assert_eq!(violation.pod, "default/a");
        assert!(matches!(violation.verdict, Verdict::PolicyViolated { .. }));
    }

    #[test]
    fn test_audit_skip_strategy() {
        let pods = vec![pod("a", PodPhase::Running, 4, &alloc("random", &[0, 1, 2, 3]))];
        let options = AuditOptions {
            skip_strategy: true,
            ..Default::default()
        };
        let report = audit_node(&node(48), &pods, &options);
        assert!(report.passed);
    }

    #[test]
    fn test_audit_flags_double_binding_without_over_quota() {
        let pods = vec![
            pod("a", PodPhase::Running, 2, &alloc("spread", &[0, 1])),
            pod("b", PodPhase::Pending, 2, &alloc("spread", &[1, 2])),
        ];
        let report = audit_node(&node(8), &pods, &AuditOptions::default());

        assert!(!report.passed);
        assert!(matches!(report.over_quota, Verdict::PolicyViolated { .. }));
        assert_eq!(report.tally.get(1), 2);
    }

    #[test]
    fn test_audit_ignores_terminal_pods() {
        let pods = vec![
            pod("a", PodPhase::Running, 2, &alloc("spread", &[0, 1])),
            pod("b", PodPhase::Succeeded, 2, &alloc("spread", &[0, 1])),
            pod("c", PodPhase::Failed, 2, &alloc("spread", &[0, 1])),
        ];
        let report = audit_node(&node(8), &pods, &AuditOptions::default());

        assert!(report.passed);
        assert_eq!(report.containers.len(), 1);
        assert_eq!(report.available.cpu_milli, 6_000);
    }

    #[test]
    fn test_audit_reports_undecodable_allocation() {
        let mut broken = pod("a", PodPhase::Running, 4, &alloc("spread", &[0, 1, 2, 3]));
        broken.allocation = None;
        broken.allocation_error = Some("malformed allocation spec".to_string());
        let pods = vec![broken, pod("b", PodPhase::Running, 2, &alloc("spread", &[4, 5]))];

        let report = audit_node(&node(48), &pods, &AuditOptions::default());

        assert!(!report.passed);
        assert_eq!(report.containers.len(), 2);
        let violation = report.violations().next().unwrap();
        assert_eq!(violation.pod, "default/a");
        assert!(matches!(violation.verdict, Verdict::InvalidInput { .. }));
        assert_eq!(report.available.cpu_milli, 42_000);
    }

    #[test]
    fn test_audit_flags_cpuset_request_mismatch() {
        let pods = vec![pod("a", PodPhase::Running, 4, &alloc("spread", &[0, 1]))];
        let report = audit_node(&node(48), &pods, &AuditOptions::default());

        assert!(!report.passed);
        assert!(matches!(
            report.containers[0].verdict,
            Verdict::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_fractional_request_is_not_cross_checked() {
        let mut fractional = pod("a", PodPhase::Running, 0, &alloc("spread", &[0, 1]));
        fractional.summary.containers[0].cpu_milli = Some(1_500);
        let report = audit_node(&node(48), &[fractional], &AuditOptions::default());
        assert!(report.passed);
    }

    #[test]
    fn test_sequence_replay_reports_first_failure() {
        let mut tally = CoreUseTally::new();
        let events = vec![
            TallyEvent::Allocate { cpu_ids: vec![0, 1] },
            TallyEvent::Allocate { cpu_ids: vec![0, 1] },
            TallyEvent::Release { cpu_ids: vec![0] },
            TallyEvent::Allocate { cpu_ids: vec![1] },
        ];

        let failure = verify_container_sequence(&mut tally, &events, 4, 1.5).unwrap_err();
        assert_eq!(failure.step, 3);
        assert_eq!(tally.get(1), 3);
    }

    #[test]
    fn test_sequence_replay_passes() {
        let mut tally = CoreUseTally::new();
        let events = vec![
            TallyEvent::Allocate { cpu_ids: vec![0, 1, 2, 3] },
            TallyEvent::Allocate { cpu_ids: vec![0, 1] },
            TallyEvent::Release { cpu_ids: vec![0, 1, 2, 3] },
        ];

        assert!(verify_container_sequence(&mut tally, &events, 4, 2.0).is_ok());
        assert_eq!(tally.bound_total(), 2);
    }
}
