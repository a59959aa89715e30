use super::ApiEndpoint;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The Azure provider's `AzureCluster`: resource group and network of a cluster.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, Eq, PartialEq)]
#[kube(
    derive = "PartialEq",
    group = "infrastructure.cluster.x-k8s.io",
    kind = "AzureCluster",
    namespaced,
    plural = "azureclusters",
    schema = "disabled",
    version = "v1alpha3"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterSpec {
    pub location: String,
    #[serde(default)]
    pub network_spec: NetworkSpec,
    pub resource_group: String,
    /// Written by the Azure provider once the load balancer exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,
    /// Fields carp does not model, kept as the API server returned them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct NetworkSpec {
    #[serde(default)]
    pub vnet: VnetSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct VnetSpec {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The Azure provider's `AzureMachineTemplate`, shared by control-plane and pool machines.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, Eq, PartialEq)]
#[kube(
    derive = "PartialEq",
    group = "infrastructure.cluster.x-k8s.io",
    kind = "AzureMachineTemplate",
    namespaced,
    plural = "azuremachinetemplates",
    schema = "disabled",
    version = "v1alpha3"
)]
pub struct AzureMachineTemplateSpec {
    pub template: AzureMachineTemplateResource,
    /// Fields carp does not model, kept as the API server returned them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct AzureMachineTemplateResource {
    pub spec: AzureMachineSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachineSpec {
    pub location: String,
    pub os_disk: OsDisk,
    pub vm_size: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(rename = "diskSizeGB")]
    pub disk_size_gb: i32,
    pub managed_disk: ManagedDisk,
    pub os_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDisk {
    pub storage_account_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
