/// Helper macro to avoid retyping the API group of the carp resources when creating further
/// string constants from it. When given no parameters, this returns the group. When given a
/// string literal parameter it adds `/parameter` to the end.
#[macro_export]
macro_rules! carp_domain {
    () => {
        "infrastructure.cluster.x-k8s.io"
    };
    ($s:literal) => {
        concat!(carp_domain!(), "/", $s)
    };
}

pub const API_VERSION: &str = carp_domain!("v1alpha1");
pub const CARP_DOMAIN_LIKE_NAME: &str = carp_domain!();
pub const NAMESPACE: &str = "carp-system";
pub const CARP: &str = "carp";

// Cluster API groups targeted by the worker pipeline.
pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";
pub const BOOTSTRAP_API_GROUP: &str = "bootstrap.cluster.x-k8s.io";
pub const CONTROLPLANE_API_GROUP: &str = "controlplane.cluster.x-k8s.io";
pub const INFRASTRUCTURE_API_GROUP: &str = carp_domain!();
pub const CAPI_VERSION: &str = "v1alpha3";

// Label keys
pub const LABEL_COMPONENT: &str = "carp.x-k8s.io/component";

// Standard tags https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_COMPONENT: &str = "app.kubernetes.io/component";
pub const APP_PART_OF: &str = "app.kubernetes.io/part-of";
pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

// controller constants
pub const CONTROLLER: &str = "controller";
pub const CONTROLLER_DEPLOYMENT_NAME: &str = "carp-controller-manager";
pub const CONTROLLER_INTERNAL_PORT: u16 = 8080; // The port on which prometheus metrics are vended.
pub const FIELD_MANAGER: &str = "carp-controller"; // Field manager for server-side apply.

// Remote bootstrap constants
pub const CREDENTIALS_SECRET_NAME: &str = "capz-manager-bootstrap-credentials";
pub const CREDENTIALS_SECRET_NAMESPACE: &str = "capz-system";
pub const KUBECONFIG_SECRET_SUFFIX: &str = "-kubeconfig";
pub const KUBECONFIG_DATA_KEY: &str = "value";
pub const NETWORK_MANIFEST_URL: &str = "https://raw.githubusercontent.com/juan-lee/cluster-api-provider-azure/hackathon/templates/addons/calico.yaml";

// Worker defaults
pub const DEFAULT_KUBERNETES_VERSION: &str = "v1.17.4";
pub const DEFAULT_REPLICAS: i32 = 1;
pub const POD_CIDR: &str = "192.168.0.0/16";
pub const CLOUD_CONFIG_PATH: &str = "/etc/kubernetes/azure.json";
