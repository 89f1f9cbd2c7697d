//! Allocation specification attached to scheduled pods
//!
//! The scheduler resolves each container's cpuset and records it, together
//! with the declared spread strategy, as a JSON annotation on the pod:
//!
//! ```json
//! {"containers":[{"name":"main","resource":{"cpu":{"cpuset":{
//!     "spreadStrategy":"sameCoreFirst","cpuIDs":[0,24,1,25]}}}}]}
//! ```

use crate::strategy::PlacementStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Annotation key carrying the allocation spec
pub const DEFAULT_ALLOCATION_ANNOTATION: &str = "alibabacloud.com/allocation-spec";

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("malformed allocation spec in annotation '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationSpec {
    #[serde(default)]
    pub containers: Vec<ContainerAllocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerAllocation {
    pub name: String,
    #[serde(default)]
    pub resource: AllocatedResource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocatedResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuAllocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuAllocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpuset: Option<CpuSetAllocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSetAllocation {
    #[serde(default)]
    pub spread_strategy: Option<PlacementStrategy>,
    #[serde(default, rename = "cpuIDs")]
    pub cpu_ids: Vec<u32>,
}

impl AllocationSpec {
    pub fn from_json(key: &str, raw: &str) -> Result<Self, AllocationError> {
        serde_json::from_str(raw).map_err(|source| AllocationError::Malformed {
            key: key.to_string(),
            source,
        })
    }

    /// Decode the spec from pod annotations; `Ok(None)` when not annotated
    pub fn from_annotations(
        annotations: &BTreeMap<String, String>,
        key: &str,
    ) -> Result<Option<Self>, AllocationError> {
        annotations
            .get(key)
            .map(|raw| Self::from_json(key, raw))
            .transpose()
    }

    pub fn container(&self, name: &str) -> Option<&ContainerAllocation> {
        self.containers.iter().find(|c| c.name == name)
    }
}

impl ContainerAllocation {
    fn cpuset(&self) -> Option<&CpuSetAllocation> {
        self.resource.cpu.as_ref()?.cpuset.as_ref()
    }

    /// Bound logical CPU ids, sorted ascending
    pub fn cpu_ids(&self) -> Vec<u32> {
        let mut ids = self
            .cpuset()
            .map(|cpuset| cpuset.cpu_ids.clone())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Declared strategy; a missing tag is reported as unsupported
    pub fn strategy(&self) -> PlacementStrategy {
        self.cpuset()
            .and_then(|cpuset| cpuset.spread_strategy.clone())
            .unwrap_or_else(|| PlacementStrategy::Unsupported(String::new()))
    }

    pub fn has_cpuset(&self) -> bool {
        self.cpuset().map_or(false, |cpuset| !cpuset.cpu_ids.is_empty())
    }
}
