/*!
Typed models for the Cluster API (and Azure provider) kinds that carp provisions for each
worker. Only the fields carp writes are modeled. Every modeled struct keeps the fields it does
not model in `extra`, so an object read from the API server is written back without losing what
the upstream providers and their webhooks put there.

Each kind implements [`ManagedResource`], which defines how a live object is overwritten with
its desired form: modeled fields take their desired values, unmodeled fields keep their live
values, and a few modeled fields that the upstream controllers fill in are kept when carp leaves
them unset.
!*/
mod azure;
mod bootstrap;
mod cluster;
mod controlplane;

pub use self::azure::{
    AzureCluster, AzureClusterSpec, AzureMachineSpec, AzureMachineTemplate,
    AzureMachineTemplateResource, AzureMachineTemplateSpec, ManagedDisk, NetworkSpec, OsDisk,
    VnetSpec,
};
pub use self::bootstrap::{
    ApiServer, ClusterConfiguration, ControlPlaneComponent, File, HostPathMount,
    InitConfiguration, JoinConfiguration, KubeadmConfigSpec, KubeadmConfigTemplate,
    KubeadmConfigTemplateResource, KubeadmConfigTemplateSpec, NodeRegistrationOptions,
};
pub use self::cluster::{
    Bootstrap, Cluster, ClusterNetwork, ClusterSpec, LabelSelector, MachineDeployment,
    MachineDeploymentSpec, MachineSpec, MachineTemplateSpec, NetworkRanges,
};
pub use self::controlplane::{KubeadmControlPlane, KubeadmControlPlaneSpec};

use kube::Resource;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// A reference to another object by kind and name, as used between Cluster API objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Fields carp does not model, kept as the API server returned them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectReference {
    /// Builds a reference to the object of kind `K` with the given name.
    pub fn to<K: Resource<DynamicType = ()>>(name: &str) -> Self {
        ObjectReference {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
            namespace: None,
            extra: Map::new(),
        }
    }
}

/// The address of a cluster's API server. Written by the providers once it is known.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ApiEndpoint {
    pub host: String,
    pub port: i32,
}

/// An object whose managed fields are reset to their desired values on every pass.
pub trait ManagedResource:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Overwrites the managed fields of `self` with those of `desired`. Identity metadata of
    /// `self` is left alone.
    fn overwrite_managed(&mut self, desired: &Self);
}

/// Carries the parts of a live value that carp does not manage into its desired form.
pub trait Unmanaged {
    fn keep_unmanaged(&mut self, live: &Self);
}

impl<T: Unmanaged> Unmanaged for Option<T> {
    fn keep_unmanaged(&mut self, live: &Self) {
        if let (Some(desired), Some(live)) = (self.as_mut(), live.as_ref()) {
            desired.keep_unmanaged(live);
        }
    }
}

/// List elements are matched by position.
impl<T: Unmanaged> Unmanaged for Vec<T> {
    fn keep_unmanaged(&mut self, live: &Self) {
        for (desired, live) in self.iter_mut().zip(live) {
            desired.keep_unmanaged(live);
        }
    }
}

/// Implements [`Unmanaged`] for a struct by keeping its `extra` fields and recursing into the
/// listed children.
macro_rules! keep_extra {
    ($($kind:ident { $($child:ident),* }),+ $(,)?) => {
        $(
            impl Unmanaged for $kind {
                fn keep_unmanaged(&mut self, live: &Self) {
                    self.extra = live.extra.clone();
                    $(self.$child.keep_unmanaged(&live.$child);)*
                }
            }
        )+
    };
}

keep_extra!(
    ClusterNetwork { pods },
    NetworkRanges {},
    MachineDeploymentSpec { selector, template },
    MachineTemplateSpec { spec },
    MachineSpec { bootstrap, infrastructure_ref },
    Bootstrap { config_ref },
    NetworkSpec { vnet },
    VnetSpec {},
    AzureMachineTemplateSpec { template },
    AzureMachineTemplateResource { spec },
    AzureMachineSpec { os_disk },
    OsDisk { managed_disk },
    ManagedDisk {},
    KubeadmConfigTemplateSpec { template },
    KubeadmConfigTemplateResource { spec },
    KubeadmConfigSpec { cluster_configuration, init_configuration, join_configuration, files },
    ClusterConfiguration { api_server, controller_manager },
    ControlPlaneComponent { extra_volumes },
    HostPathMount {},
    InitConfiguration { node_registration },
    JoinConfiguration { node_registration },
    NodeRegistrationOptions {},
    File {},
    KubeadmControlPlaneSpec { infrastructure_template, kubeadm_config_spec },
);

impl Unmanaged for ApiServer {
    fn keep_unmanaged(&mut self, live: &Self) {
        self.component.keep_unmanaged(&live.component);
    }
}

/// The Cluster API webhooks default a reference's namespace to its owner's.
impl Unmanaged for ObjectReference {
    fn keep_unmanaged(&mut self, live: &Self) {
        self.extra = live.extra.clone();
        if self.namespace.is_none() {
            self.namespace = live.namespace.clone();
        }
    }
}

/// The MachineDeployment webhook adds its own selector labels. carp's labels win.
impl Unmanaged for LabelSelector {
    fn keep_unmanaged(&mut self, live: &Self) {
        self.extra = live.extra.clone();
        for (key, value) in &live.match_labels {
            self.match_labels
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl Unmanaged for ClusterSpec {
    fn keep_unmanaged(&mut self, live: &Self) {
        self.extra = live.extra.clone();
        if self.control_plane_endpoint.is_none() {
            self.control_plane_endpoint = live.control_plane_endpoint.clone();
        }
        self.cluster_network.keep_unmanaged(&live.cluster_network);
        self.control_plane_ref.keep_unmanaged(&live.control_plane_ref);
        self.infrastructure_ref.keep_unmanaged(&live.infrastructure_ref);
    }
}

impl Unmanaged for AzureClusterSpec {
    fn keep_unmanaged(&mut self, live: &Self) {
        self.extra = live.extra.clone();
        if self.control_plane_endpoint.is_none() {
            self.control_plane_endpoint = live.control_plane_endpoint.clone();
        }
        self.network_spec.keep_unmanaged(&live.network_spec);
    }
}

macro_rules! spec_managed {
    ($($kind:ty),+) => {
        $(
            impl ManagedResource for $kind {
                fn overwrite_managed(&mut self, desired: &Self) {
                    let mut spec = desired.spec.clone();
                    spec.keep_unmanaged(&self.spec);
                    self.spec = spec;
                }
            }
        )+
    };
}

spec_managed!(
    Cluster,
    KubeadmConfigTemplate,
    KubeadmControlPlane,
    AzureMachineTemplate,
    MachineDeployment,
    AzureCluster
);

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str, spec: ClusterSpec) -> Cluster {
        Cluster::new(name, spec)
    }

    #[test]
    fn test_reference_to_kind() {
        let reference = ObjectReference::to::<KubeadmControlPlane>("alpha");
        assert_eq!(
            reference,
            ObjectReference {
                api_version: "controlplane.cluster.x-k8s.io/v1alpha3".to_string(),
                kind: "KubeadmControlPlane".to_string(),
                name: "alpha".to_string(),
                namespace: None,
                extra: Map::new(),
            }
        );
    }

    #[test]
    fn test_overwrite_keeps_provider_endpoint() {
        let endpoint = ApiEndpoint {
            host: "alpha.westus2.cloudapp.azure.com".to_string(),
            port: 6443,
        };
        let mut live = cluster(
            "alpha",
            ClusterSpec {
                control_plane_endpoint: Some(endpoint.clone()),
                control_plane_ref: Some(ObjectReference::to::<KubeadmControlPlane>("stale")),
                ..Default::default()
            },
        );
        live.metadata.resource_version = Some("42".to_string());

        let desired = cluster(
            "alpha",
            ClusterSpec {
                control_plane_ref: Some(ObjectReference::to::<KubeadmControlPlane>("alpha")),
                ..Default::default()
            },
        );

        live.overwrite_managed(&desired);

        assert_eq!(live.spec.control_plane_endpoint, Some(endpoint));
        assert_eq!(live.spec.control_plane_ref, desired.spec.control_plane_ref);
        assert_eq!(live.metadata.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_overwrite_discards_external_edits() {
        let mut live = MachineDeployment::new(
            "alpha",
            MachineDeploymentSpec {
                replicas: Some(7),
                ..Default::default()
            },
        );
        let desired = MachineDeployment::new(
            "alpha",
            MachineDeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            },
        );

        live.overwrite_managed(&desired);
        assert_eq!(live.spec, desired.spec);
    }

    #[test]
    fn test_overwrite_keeps_unmodeled_and_defaulted_fields() {
        let live: MachineDeployment = serde_json::from_value(serde_json::json!({
            "apiVersion": "cluster.x-k8s.io/v1alpha3",
            "kind": "MachineDeployment",
            "metadata": { "name": "alpha", "namespace": "default" },
            "spec": {
                "clusterName": "alpha",
                "replicas": 7,
                "minReadySeconds": 0,
                "strategy": { "type": "RollingUpdate" },
                "selector": {
                    "matchLabels": { "cluster.x-k8s.io/deployment-name": "alpha" }
                },
                "template": {
                    "metadata": {
                        "labels": { "cluster.x-k8s.io/deployment-name": "alpha" }
                    },
                    "spec": {
                        "clusterName": "alpha",
                        "bootstrap": {},
                        "infrastructureRef": {
                            "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha3",
                            "kind": "AzureMachineTemplate",
                            "name": "stale",
                            "namespace": "default"
                        }
                    }
                }
            }
        }))
        .unwrap();

        let mut desired = MachineDeployment::new(
            "alpha",
            MachineDeploymentSpec {
                cluster_name: "alpha".to_string(),
                replicas: Some(3),
                ..Default::default()
            },
        );
        desired.spec.template.spec.cluster_name = "alpha".to_string();
        desired.spec.template.spec.infrastructure_ref =
            ObjectReference::to::<AzureMachineTemplate>("alpha");

        let mut updated = live.clone();
        updated.overwrite_managed(&desired);
        let spec = serde_json::to_value(&updated.spec).unwrap();

        assert_eq!(spec["replicas"], 3);
        assert_eq!(spec["minReadySeconds"], 0);
        assert_eq!(spec["strategy"]["type"], "RollingUpdate");
        assert_eq!(
            spec["selector"]["matchLabels"]["cluster.x-k8s.io/deployment-name"],
            "alpha"
        );
        assert_eq!(
            spec["template"]["metadata"]["labels"]["cluster.x-k8s.io/deployment-name"],
            "alpha"
        );
        assert_eq!(spec["template"]["spec"]["infrastructureRef"]["name"], "alpha");
        assert_eq!(spec["template"]["spec"]["infrastructureRef"]["namespace"], "default");

        // Once converged, overwriting again leaves the object as it is.
        let mut again = updated.clone();
        again.overwrite_managed(&desired);
        assert_eq!(again, updated);
    }

    #[test]
    fn test_overwrite_keeps_provider_network() {
        let live: AzureCluster = serde_json::from_value(serde_json::json!({
            "apiVersion": "infrastructure.cluster.x-k8s.io/v1alpha3",
            "kind": "AzureCluster",
            "metadata": { "name": "alpha", "namespace": "default" },
            "spec": {
                "location": "westus2",
                "resourceGroup": "alpha",
                "networkSpec": {
                    "vnet": { "name": "alpha-vnet", "id": "/subscriptions/s/vnet", "cidrBlocks": ["10.0.0.0/8"] },
                    "subnets": [{ "name": "alpha-node-subnet", "role": "node" }]
                }
            }
        }))
        .unwrap();

        let mut desired = AzureCluster::new(
            "alpha",
            AzureClusterSpec {
                location: "eastus".to_string(),
                resource_group: "alpha".to_string(),
                ..Default::default()
            },
        );
        desired.spec.network_spec.vnet.name = "alpha-vnet".to_string();

        let mut updated = live.clone();
        updated.overwrite_managed(&desired);
        let network = serde_json::to_value(&updated.spec.network_spec).unwrap();

        assert_eq!(updated.spec.location, "eastus");
        assert_eq!(network["vnet"]["id"], "/subscriptions/s/vnet");
        assert_eq!(network["vnet"]["cidrBlocks"][0], "10.0.0.0/8");
        assert_eq!(network["subnets"][0]["role"], "node");
    }
}
