/*!
Builders for the desired form of each object in a worker's stack. Builders perform no I/O and
return identical objects for identical inputs. Every object is named after the worker and lives
in the worker's namespace.
!*/
mod cloud_config;

pub use self::cloud_config::cloud_provider_config;

use crate::config::CloudSettings;
use crate::error::{self, Result};
use models::capi::{
    ApiServer, AzureCluster, AzureClusterSpec, AzureMachineSpec, AzureMachineTemplate,
    AzureMachineTemplateResource, AzureMachineTemplateSpec, Bootstrap, Cluster, ClusterConfiguration,
    ClusterNetwork, ClusterSpec, ControlPlaneComponent, File, HostPathMount, InitConfiguration,
    JoinConfiguration, KubeadmConfigSpec, KubeadmConfigTemplate, KubeadmConfigTemplateResource,
    KubeadmConfigTemplateSpec, KubeadmControlPlane, KubeadmControlPlaneSpec, LabelSelector,
    MachineDeployment, MachineDeploymentSpec, MachineSpec, MachineTemplateSpec, ManagedDisk,
    NetworkRanges, NetworkSpec, NodeRegistrationOptions, ObjectReference, OsDisk, VnetSpec,
};
use models::constants::{CLOUD_CONFIG_PATH, POD_CIDR};
use models::worker::Worker;

use kube::Resource;
use maplit::btreemap;
use snafu::OptionExt;
use std::collections::BTreeMap;

const CLOUD_PROVIDER: &str = "azure";
const CLOUD_CONFIG_VOLUME: &str = "cloud-config";
const CONTROL_PLANE_TIMEOUT: &str = "20m0s";
const NODE_NAME_TEMPLATE: &str = r#"{{ ds.meta_data["local_hostname"] }}"#;

const OS_DISK_SIZE_GB: i32 = 1024;
const OS_DISK_STORAGE_ACCOUNT_TYPE: &str = "Premium_LRS";
const OS_TYPE: &str = "Linux";
const VM_SIZE: &str = "Standard_D8s_v3";

/// The inputs every builder draws from, taken from one worker.
#[derive(Clone, Debug)]
pub struct WorkerTemplate<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
    pub location: &'a str,
    pub replicas: i32,
    pub version: &'a str,
    pub cloud: &'a CloudSettings,
}

impl<'a> WorkerTemplate<'a> {
    pub fn from_worker(worker: &'a Worker, cloud: &'a CloudSettings) -> Result<Self> {
        let meta = worker.meta();
        Ok(WorkerTemplate {
            name: meta
                .name
                .as_deref()
                .context(error::MissingWorkerFieldSnafu {
                    field: "metadata.name",
                })?,
            namespace: meta
                .namespace
                .as_deref()
                .context(error::MissingWorkerFieldSnafu {
                    field: "metadata.namespace",
                })?,
            location: &worker.spec.location,
            replicas: worker.spec.replicas,
            version: &worker.spec.version,
            cloud,
        })
    }

    /// Names and places a freshly built object.
    fn place<K: Resource>(&self, mut object: K) -> K {
        object.meta_mut().namespace = Some(self.namespace.to_string());
        object
    }

    fn cloud_config_file(&self) -> Result<File> {
        Ok(File {
            path: CLOUD_CONFIG_PATH.to_string(),
            owner: "root:root".to_string(),
            permissions: "0644".to_string(),
            content: cloud_provider_config(self.name, self.location, self.cloud)?,
            ..Default::default()
        })
    }

    pub fn cluster(&self) -> Cluster {
        self.place(Cluster::new(
            self.name,
            ClusterSpec {
                cluster_network: Some(ClusterNetwork {
                    pods: Some(NetworkRanges {
                        cidr_blocks: vec![POD_CIDR.to_string()],
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                control_plane_endpoint: None,
                control_plane_ref: Some(ObjectReference::to::<KubeadmControlPlane>(self.name)),
                infrastructure_ref: Some(ObjectReference::to::<AzureCluster>(self.name)),
                ..Default::default()
            },
        ))
    }

    pub fn kubeadm_config_template(&self) -> Result<KubeadmConfigTemplate> {
        Ok(self.place(KubeadmConfigTemplate::new(
            self.name,
            KubeadmConfigTemplateSpec {
                template: KubeadmConfigTemplateResource {
                    spec: KubeadmConfigSpec {
                        files: vec![self.cloud_config_file()?],
                        join_configuration: Some(JoinConfiguration {
                            node_registration: node_registration(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
        )))
    }

    pub fn kubeadm_control_plane(&self) -> Result<KubeadmControlPlane> {
        let mut controller_manager_args = cloud_provider_args();
        controller_manager_args.insert("allocate-node-cidrs".to_string(), "false".to_string());

        Ok(self.place(KubeadmControlPlane::new(
            self.name,
            KubeadmControlPlaneSpec {
                replicas: Some(self.replicas),
                version: self.version.to_string(),
                infrastructure_template: ObjectReference::to::<AzureMachineTemplate>(self.name),
                kubeadm_config_spec: KubeadmConfigSpec {
                    cluster_configuration: Some(ClusterConfiguration {
                        api_server: ApiServer {
                            component: ControlPlaneComponent {
                                extra_args: cloud_provider_args(),
                                extra_volumes: vec![cloud_config_mount()],
                                ..Default::default()
                            },
                            timeout_for_control_plane: Some(CONTROL_PLANE_TIMEOUT.to_string()),
                        },
                        controller_manager: ControlPlaneComponent {
                            extra_args: controller_manager_args,
                            extra_volumes: vec![cloud_config_mount()],
                            ..Default::default()
                        },
                        ..Default::default()
                    }),
                    init_configuration: Some(InitConfiguration {
                        node_registration: node_registration(),
                        ..Default::default()
                    }),
                    join_configuration: Some(JoinConfiguration {
                        node_registration: node_registration(),
                        ..Default::default()
                    }),
                    files: vec![self.cloud_config_file()?],
                    use_experimental_retry_join: Some(true),
                    ..Default::default()
                },
                ..Default::default()
            },
        )))
    }

    pub fn azure_machine_template(&self) -> AzureMachineTemplate {
        self.place(AzureMachineTemplate::new(
            self.name,
            AzureMachineTemplateSpec {
                template: AzureMachineTemplateResource {
                    spec: AzureMachineSpec {
                        location: self.location.to_string(),
                        os_disk: OsDisk {
                            disk_size_gb: OS_DISK_SIZE_GB,
                            managed_disk: ManagedDisk {
                                storage_account_type: OS_DISK_STORAGE_ACCOUNT_TYPE.to_string(),
                                ..Default::default()
                            },
                            os_type: OS_TYPE.to_string(),
                            ..Default::default()
                        },
                        vm_size: VM_SIZE.to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
        ))
    }

    pub fn machine_deployment(&self) -> MachineDeployment {
        self.place(MachineDeployment::new(
            self.name,
            MachineDeploymentSpec {
                cluster_name: self.name.to_string(),
                replicas: Some(self.replicas),
                selector: LabelSelector::default(),
                template: MachineTemplateSpec {
                    spec: MachineSpec {
                        cluster_name: self.name.to_string(),
                        bootstrap: Bootstrap {
                            config_ref: Some(ObjectReference::to::<KubeadmConfigTemplate>(
                                self.name,
                            )),
                            ..Default::default()
                        },
                        infrastructure_ref: ObjectReference::to::<AzureMachineTemplate>(
                            self.name,
                        ),
                        version: Some(self.version.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                ..Default::default()
            },
        ))
    }

    pub fn azure_cluster(&self) -> AzureCluster {
        self.place(AzureCluster::new(
            self.name,
            AzureClusterSpec {
                location: self.location.to_string(),
                network_spec: NetworkSpec {
                    vnet: VnetSpec {
                        name: cloud_config::vnet_name(self.name),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                resource_group: self.name.to_string(),
                control_plane_endpoint: None,
                ..Default::default()
            },
        ))
    }
}

fn cloud_provider_args() -> BTreeMap<String, String> {
    btreemap! {
        "cloud-config".to_string() => CLOUD_CONFIG_PATH.to_string(),
        "cloud-provider".to_string() => CLOUD_PROVIDER.to_string(),
    }
}

fn cloud_config_mount() -> HostPathMount {
    HostPathMount {
        name: CLOUD_CONFIG_VOLUME.to_string(),
        host_path: CLOUD_CONFIG_PATH.to_string(),
        mount_path: CLOUD_CONFIG_PATH.to_string(),
        read_only: true,
        ..Default::default()
    }
}

fn node_registration() -> NodeRegistrationOptions {
    NodeRegistrationOptions {
        name: Some(NODE_NAME_TEMPLATE.to_string()),
        kubelet_extra_args: cloud_provider_args(),
        ..Default::default()
    }
}
