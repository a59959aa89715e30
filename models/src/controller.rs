use crate::constants::{
    APP_COMPONENT, APP_MANAGED_BY, APP_PART_OF, BOOTSTRAP_API_GROUP, CARP, CARP_DOMAIN_LIKE_NAME,
    CLUSTER_API_GROUP, CONTROLLER, CONTROLLER_DEPLOYMENT_NAME, CONTROLLER_INTERNAL_PORT,
    CONTROLPLANE_API_GROUP, LABEL_COMPONENT, NAMESPACE,
};
use crate::managed_cluster::{K8S_MANAGED_CLUSTER_PLURAL, K8S_MANAGED_CLUSTER_STATUS};
use crate::worker::{K8S_WORKER_PLURAL, K8S_WORKER_STATUS};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, LocalObjectReference, PodSpec, PodTemplateSpec,
    SecretEnvSource, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use maplit::btreemap;

const CARP_CONTROLLER_SERVICE_ACCOUNT: &str = "carp-controller-service-account";
const CARP_CONTROLLER_CLUSTER_ROLE: &str = "carp-controller-role";
/// Secret holding the `AZURE_*` settings the controller reads from its environment.
pub const CARP_CLOUD_SETTINGS_SECRET: &str = "carp-cloud-settings";

const ALL_VERBS: &[&str] = &["get", "list", "watch", "create", "update", "patch", "delete"];

fn verbs(verbs: &[&str]) -> Vec<String> {
    verbs.iter().map(|s| s.to_string()).collect()
}

fn strings(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|s| s.to_string()).collect())
}

/// Defines the carp-controller service account
pub fn controller_service_account() -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(CARP_CONTROLLER_SERVICE_ACCOUNT.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            annotations: Some(btreemap! {
                "kubernetes.io/service-account.name".to_string() => CARP_CONTROLLER_SERVICE_ACCOUNT.to_string()
            }),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Defines the carp-controller cluster role
pub fn controller_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(CARP_CONTROLLER_CLUSTER_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: strings(&[CARP_DOMAIN_LIKE_NAME]),
                resources: strings(&[K8S_WORKER_PLURAL, K8S_MANAGED_CLUSTER_PLURAL]),
                verbs: verbs(ALL_VERBS),
                ..Default::default()
            },
            PolicyRule {
                api_groups: strings(&[CARP_DOMAIN_LIKE_NAME]),
                resources: strings(&[K8S_WORKER_STATUS, K8S_MANAGED_CLUSTER_STATUS]),
                verbs: verbs(&["get", "update", "patch"]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: strings(&[
                    CARP_DOMAIN_LIKE_NAME,
                    BOOTSTRAP_API_GROUP,
                    CONTROLPLANE_API_GROUP,
                ]),
                resources: strings(&["*"]),
                verbs: verbs(ALL_VERBS),
                ..Default::default()
            },
            PolicyRule {
                api_groups: strings(&[CLUSTER_API_GROUP]),
                resources: strings(&[
                    "clusters",
                    "clusters/status",
                    "machinedeployments",
                    "machinedeployments/status",
                ]),
                verbs: verbs(ALL_VERBS),
                ..Default::default()
            },
            PolicyRule {
                api_groups: strings(&[""]),
                resources: strings(&["secrets"]),
                verbs: verbs(&["get", "list", "watch", "create", "patch"]),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

/// Defines the carp-controller cluster role binding
pub fn controller_cluster_role_binding() -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some("carp-controller-role-binding".to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: CARP_CONTROLLER_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: CARP_CONTROLLER_SERVICE_ACCOUNT.to_string(),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        }]),
    }
}

/// Defines the carp-controller deployment
pub fn controller_deployment(carp_image: String, image_pull_secret: Option<String>) -> Deployment {
    let image_pull_secrets =
        image_pull_secret.map(|secret| vec![LocalObjectReference { name: Some(secret) }]);

    Deployment {
        metadata: ObjectMeta {
            labels: Some(btreemap! {
                APP_COMPONENT.to_string() => CONTROLLER.to_string(),
                APP_MANAGED_BY.to_string() => CARP.to_string(),
                APP_PART_OF.to_string() => CARP.to_string(),
                LABEL_COMPONENT.to_string() => CONTROLLER.to_string(),
            }),
            name: Some(CONTROLLER_DEPLOYMENT_NAME.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(
                    btreemap! { LABEL_COMPONENT.to_string() => CONTROLLER.to_string()},
                ),
                ..Default::default()
            },
            // Two controllers must never converge the same worker at once.
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(btreemap! {
                        LABEL_COMPONENT.to_string() => CONTROLLER.to_string(),
                    }),
                    namespace: Some(NAMESPACE.to_string()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        image: Some(carp_image),
                        image_pull_policy: None,
                        name: CARP.to_string(),
                        command: Some(vec!["./controller".to_string()]),
                        env_from: Some(vec![EnvFromSource {
                            secret_ref: Some(SecretEnvSource {
                                name: Some(CARP_CLOUD_SETTINGS_SECRET.to_string()),
                                optional: Some(false),
                            }),
                            ..Default::default()
                        }]),
                        ports: Some(vec![ContainerPort {
                            name: Some("metrics".to_string()),
                            container_port: i32::from(CONTROLLER_INTERNAL_PORT),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    image_pull_secrets,
                    service_account_name: Some(CARP_CONTROLLER_SERVICE_ACCOUNT.to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_covers_worker_status() {
        let role = controller_cluster_role();
        let rules = role.rules.unwrap();
        assert!(rules.iter().any(|rule| {
            rule.resources
                .as_ref()
                .map_or(false, |r| r.contains(&"workers/status".to_string()))
                && rule.verbs.contains(&"update".to_string())
        }));
    }

    #[test]
    fn test_deployment_uses_image() {
        let deployment = controller_deployment("carp:latest".to_string(), None);
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("carp:latest"));
        assert!(pod.image_pull_secrets.is_none());
    }
}
