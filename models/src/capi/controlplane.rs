use super::{KubeadmConfigSpec, ObjectReference};

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kubeadm control-plane provider's `KubeadmControlPlane`.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, Eq, PartialEq)]
#[kube(
    derive = "PartialEq",
    group = "controlplane.cluster.x-k8s.io",
    kind = "KubeadmControlPlane",
    namespaced,
    plural = "kubeadmcontrolplanes",
    schema = "disabled",
    version = "v1alpha3"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    pub version: String,
    pub infrastructure_template: ObjectReference,
    pub kubeadm_config_spec: KubeadmConfigSpec,
    /// Fields carp does not model, kept as the API server returned them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
