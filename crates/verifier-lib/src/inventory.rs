//! Node and pod inventory
//!
//! Every query goes back to the authoritative source; nothing is cached, so
//! each accounting or audit call sees the current pod list.

use crate::allocation::AllocationSpec;
use crate::audit::{audit_node, AuditOptions, NodeAuditReport};
use crate::quantity::{parse_bytes, parse_cpu_millis, QuantityError};
use crate::resources::{
    compute_available, ContainerRequests, PodPhase, PodSummary, ResourceAmounts,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";
pub const EPHEMERAL_STORAGE: &str = "ephemeral-storage";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("node '{0}' not found")]
    NotFound(String),
    #[error("bad {resource} quantity on {object}: {source}")]
    Quantity {
        object: String,
        resource: String,
        #[source]
        source: QuantityError,
    },
}

/// Allocatable capacity and CPU count of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub allocatable: ResourceAmounts,
    /// Logical CPUs the node advertises in its capacity
    pub logical_cpus: u32,
}

/// A pod bound to the node, reduced to what the verifier reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    pub summary: PodSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<AllocationSpec>,
    /// Decode failure of the allocation annotation; resource accounting ignores it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_error: Option<String>,
}

impl PodRecord {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Source of node and pod state
#[async_trait]
pub trait NodeInventory: Send + Sync {
    /// Fetch the node's allocatable capacity
    async fn node(&self, name: &str) -> Result<NodeSnapshot, InventoryError>;

    /// List every pod currently bound to the node
    async fn pods_on_node(&self, name: &str) -> Result<Vec<PodRecord>, InventoryError>;
}

/// Inventory backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeInventory {
    client: kube::Client,
    annotation_key: String,
}

impl KubeInventory {
    pub fn new(client: kube::Client, annotation_key: impl Into<String>) -> Self {
        Self {
            client,
            annotation_key: annotation_key.into(),
        }
    }

    /// Build from in-cluster config or the local kubeconfig
    pub async fn try_default(annotation_key: impl Into<String>) -> Result<Self, InventoryError> {
        let client = kube::Client::try_default().await?;
        Ok(Self::new(client, annotation_key))
    }
}

#[async_trait]
impl NodeInventory for KubeInventory {
    async fn node(&self, name: &str) -> Result<NodeSnapshot, InventoryError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get_opt(name)
            .await?
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))?;
        snapshot_from_node(&node)
    }

    async fn pods_on_node(&self, name: &str) -> Result<Vec<PodRecord>, InventoryError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", name));
        let list = pods.list(&params).await?;
        debug!(node = %name, pods = list.items.len(), "Listed pods on node");

        list.items
            .iter()
            .map(|pod| record_from_pod(pod, &self.annotation_key))
            .collect()
    }
}

fn quantity_of(
    map: Option<&BTreeMap<String, Quantity>>,
    resource: &str,
    object: &str,
    parse: fn(&str) -> Result<i64, QuantityError>,
) -> Result<Option<i64>, InventoryError> {
    match map.and_then(|m| m.get(resource)) {
        None => Ok(None),
        Some(quantity) => parse(&quantity.0)
            .map(Some)
            .map_err(|source| InventoryError::Quantity {
                object: object.to_string(),
                resource: resource.to_string(),
                source,
            }),
    }
}

/// Reduce a Node object to its allocatable amounts; missing entries are zero
pub fn snapshot_from_node(node: &Node) -> Result<NodeSnapshot, InventoryError> {
    let name = node.metadata.name.clone().unwrap_or_default();
    let object = format!("node/{}", name);
    let status = node.status.as_ref();
    let allocatable = status.and_then(|s| s.allocatable.as_ref());
    let capacity = status.and_then(|s| s.capacity.as_ref());

    let cpu_capacity = match quantity_of(capacity, CPU, &object, parse_cpu_millis)? {
        Some(millis) => Some(millis),
        None => quantity_of(allocatable, CPU, &object, parse_cpu_millis)?,
    };

    Ok(NodeSnapshot {
        allocatable: ResourceAmounts {
            cpu_milli: quantity_of(allocatable, CPU, &object, parse_cpu_millis)?.unwrap_or(0),
            memory_bytes: quantity_of(allocatable, MEMORY, &object, parse_bytes)?.unwrap_or(0),
            ephemeral_storage_bytes: quantity_of(
                allocatable,
                EPHEMERAL_STORAGE,
                &object,
                parse_bytes,
            )?
            .unwrap_or(0),
        },
        logical_cpus: u32::try_from(cpu_capacity.unwrap_or(0).max(0) / 1000).unwrap_or(u32::MAX),
        name,
    })
}

/// Reduce a Pod object to its phase, requests and allocation spec
pub fn record_from_pod(pod: &Pod, annotation_key: &str) -> Result<PodRecord, InventoryError> {
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let name = pod.metadata.name.clone().unwrap_or_default();
    let object = format!("pod/{}/{}", namespace, name);

    let mut containers = Vec::new();
    for container in pod.spec.iter().flat_map(|spec| spec.containers.iter()) {
        let requests = container.resources.as_ref().and_then(|r| r.requests.as_ref());
        containers.push(ContainerRequests {
            name: Some(container.name.clone()),
            cpu_milli: quantity_of(requests, CPU, &object, parse_cpu_millis)?,
            memory_bytes: quantity_of(requests, MEMORY, &object, parse_bytes)?,
            ephemeral_storage_bytes: quantity_of(
                requests,
                EPHEMERAL_STORAGE,
                &object,
                parse_bytes,
            )?,
        });
    }

    let phase = PodPhase::from_status(pod.status.as_ref().and_then(|s| s.phase.as_deref()));

    let decoded = match pod.metadata.annotations.as_ref() {
        Some(annotations) => AllocationSpec::from_annotations(annotations, annotation_key),
        None => Ok(None),
    };
    let (allocation, allocation_error) = match decoded {
        Ok(allocation) => (allocation, None),
        Err(err) => {
            warn!(pod = %object, error = %err, "Ignoring malformed allocation spec");
            (None, Some(err.to_string()))
        }
    };

    Ok(PodRecord {
        namespace,
        name,
        summary: PodSummary { phase, containers },
        allocation,
        allocation_error,
    })
}

/// Available resources on a node, recomputed from a fresh inventory read
pub async fn node_available(
    inventory: &dyn NodeInventory,
    node: &str,
) -> Result<ResourceAmounts, InventoryError> {
    let snapshot = inventory.node(node).await?;
    let pods = inventory.pods_on_node(node).await?;
    Ok(compute_available(
        snapshot.allocatable,
        pods.iter().map(|pod| &pod.summary),
    ))
}

/// Audit a node from a fresh inventory read
pub async fn node_audit(
    inventory: &dyn NodeInventory,
    node: &str,
    options: &AuditOptions,
) -> Result<NodeAuditReport, InventoryError> {
    let snapshot = inventory.node(node).await?;
    let pods = inventory.pods_on_node(node).await?;
    Ok(audit_node(&snapshot, &pods, options))
}
