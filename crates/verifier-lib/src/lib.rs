//! Verifier library for CPU-topology allocations
//!
//! This crate provides the core functionality for:
//! - Mapping logical CPU ids onto physical cores
//! - Checking a container's cpuset against its placement strategy
//! - Checking node-wide CPU bindings against an over-quota ratio
//! - Computing a node's available CPU/memory/ephemeral-storage
//! - Auditing a node through a Kubernetes inventory
//! - Metrics and structured logging

pub mod allocation;
pub mod audit;
pub mod inventory;
pub mod observability;
pub mod overquota;
pub mod quantity;
pub mod resources;
pub mod strategy;
pub mod tally;
pub mod topology;
pub mod verdict;


pub use allocation::{
    AllocationError, AllocationSpec, ContainerAllocation, DEFAULT_ALLOCATION_ANNOTATION,
};
pub use audit::{
    audit_node, verify_container_sequence, AuditOptions, ContainerAudit, NodeAuditReport,
    StepFailure, TallyEvent,
};
pub use inventory::{
    node_audit, node_available, InventoryError, KubeInventory, NodeInventory, NodeSnapshot,
    PodRecord,
};
pub use observability::{StructuredLogger, VerifierMetrics};
pub use overquota::{check_over_quota, evaluate_over_quota};
pub use resources::{compute_available, ContainerRequests, PodPhase, PodSummary, ResourceAmounts};
pub use strategy::{check_placement, evaluate_placement, PlacementStrategy};
pub use tally::CoreUseTally;
pub use verdict::Verdict;
