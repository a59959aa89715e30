//! The `ManagedCluster` custom resource links a hosted workload to the worker that will run it.
//! Nothing in carp assigns workers yet; the resource is defined so it can be served and stored.
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const K8S_MANAGED_CLUSTER_PLURAL: &str = "managedclusters";
pub const K8S_MANAGED_CLUSTER_STATUS: &str = "managedclusters/status";

#[derive(Copy, Clone, Serialize, Deserialize, Debug, Default, Eq, PartialEq, JsonSchema)]
pub enum ManagedClusterPhase {
    #[default]
    Pending,
    Running,
    Terminating,
}

#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, Eq, PartialEq, JsonSchema)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "infrastructure.cluster.x-k8s.io",
    kind = "ManagedCluster",
    namespaced,
    plural = "managedclusters",
    singular = "managedcluster",
    status = "ManagedClusterStatus",
    version = "v1alpha1",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Worker", "type":"string", "jsonPath":".status.assignedWorker"}"#
)]
pub struct ManagedClusterSpec {}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    #[serde(default)]
    pub phase: ManagedClusterPhase,
    /// Name of the worker hosting this cluster, once one is assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
}
