//! Available-resource accounting
//!
//! A node's spare capacity is its advertised allocatable amount minus the
//! requests of every pod on it that has not reached a terminal phase.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CPU (millicores), memory (bytes) and ephemeral storage (bytes).
///
/// Signed so that over-commitment shows up as a negative residual.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAmounts {
    pub cpu_milli: i64,
    pub memory_bytes: i64,
    pub ephemeral_storage_bytes: i64,
}

impl ResourceAmounts {
    pub fn new(cpu_milli: i64, memory_bytes: i64, ephemeral_storage_bytes: i64) -> Self {
        Self {
            cpu_milli,
            memory_bytes,
            ephemeral_storage_bytes,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            cpu_milli: self.cpu_milli.saturating_add(other.cpu_milli),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
            ephemeral_storage_bytes: self
                .ephemeral_storage_bytes
                .saturating_add(other.ephemeral_storage_bytes),
        }
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self {
            cpu_milli: self.cpu_milli.saturating_sub(other.cpu_milli),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            ephemeral_storage_bytes: self
                .ephemeral_storage_bytes
                .saturating_sub(other.ephemeral_storage_bytes),
        }
    }

    /// True when any residual went negative
    pub fn is_overcommitted(&self) -> bool {
        self.cpu_milli < 0 || self.memory_bytes < 0 || self.ephemeral_storage_bytes < 0
    }
}

/// Kubernetes pod lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the phase string reported in pod status; absent means Pending
    pub fn from_status(phase: Option<&str>) -> Self {
        match phase {
            None => PodPhase::Pending,
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            Some(_) => PodPhase::Unknown,
        }
    }

    /// Succeeded and Failed pods no longer hold node resources
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(phase)
    }
}

/// Declared requests of one container; a missing request counts as zero
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_milli: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage_bytes: Option<i64>,
}

impl ContainerRequests {
    pub fn amounts(&self) -> ResourceAmounts {
        ResourceAmounts {
            cpu_milli: self.cpu_milli.unwrap_or(0),
            memory_bytes: self.memory_bytes.unwrap_or(0),
            ephemeral_storage_bytes: self.ephemeral_storage_bytes.unwrap_or(0),
        }
    }
}

/// Phase and container requests of a pod bound to the node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSummary {
    #[serde(default)]
    pub phase: PodPhase,
    #[serde(default)]
    pub containers: Vec<ContainerRequests>,
}

impl PodSummary {
    /// Sum of the container requests
    pub fn requests(&self) -> ResourceAmounts {
        self.containers
            .iter()
            .fold(ResourceAmounts::zero(), |total, c| {
                total.saturating_add(c.amounts())
            })
    }

    pub fn container(&self, name: &str) -> Option<&ContainerRequests> {
        self.containers
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
    }
}

/// Subtract the requests of all non-terminal pods from the node's allocatable
/// amounts. Negative residuals are returned as-is.
pub fn compute_available<'a, I>(allocatable: ResourceAmounts, pods: I) -> ResourceAmounts
where
    I: IntoIterator<Item = &'a PodSummary>,
{
    pods.into_iter()
        .filter(|pod| !pod.phase.is_terminal())
        .fold(allocatable, |available, pod| available.saturating_sub(pod.requests()))
}
