/*!
Bootstraps a freshly provisioned workload cluster through the kubeconfig that Cluster API
publishes for it: the operator credentials are copied into the remote cluster and the network
plugin manifest is applied there.
!*/
use crate::config::ControllerConfig;
use crate::converge::{ensure, OperationResult};
use crate::error::{self, Result};
use models::constants::KUBECONFIG_DATA_KEY;
use models::namespace::remote_namespace;
use models::store::{from_dynamic, KubeObjectStore, ObjectKey, ObjectStore};
use models::worker::kubeconfig_secret_name;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use kube::config::{KubeConfigOptions, Kubeconfig};
use serde::Deserialize;
use kube::discovery::Scope;
use snafu::{OptionExt, ResultExt};
use std::collections::HashMap;
use std::convert::TryFrom;
use tokio::time::Duration;
use tracing::{event, instrument, Level};

#[cfg(test)]
use mockall::mock;

const MANIFEST_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NAMESPACE: &str = "default";

#[async_trait]
/// Opens an `ObjectStore` on a remote cluster from its kubeconfig.
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn ObjectStore>>;
}

#[cfg(test)]
mock! {
    pub RemoteConnector {}
    #[async_trait]
    impl RemoteConnector for RemoteConnector {
        async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn ObjectStore>>;
    }
}

/// Connects to remote clusters with kube clients built from the published kubeconfig.
#[derive(Clone, Debug, Default)]
pub struct KubeconfigConnector;

#[async_trait]
impl RemoteConnector for KubeconfigConnector {
    #[instrument(skip(self, kubeconfig), err)]
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn ObjectStore>> {
        let kubeconfig = std::str::from_utf8(kubeconfig).context(error::KubeconfigEncodingSnafu)?;
        let kubeconfig = Kubeconfig::from_yaml(kubeconfig).context(error::KubeconfigLoadSnafu)?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(error::KubeconfigLoadSnafu)?;
        let client = kube::Client::try_from(config).context(error::RemoteClientSnafu)?;
        Ok(Box::new(KubeObjectStore::new(client)))
    }
}

#[async_trait]
/// Fetches the text of a manifest.
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[cfg(test)]
mock! {
    pub ManifestSource {}
    #[async_trait]
    impl ManifestSource for ManifestSource {
        async fn fetch(&self, url: &str) -> Result<String>;
    }
}

/// Fetches manifests over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpManifestSource {
    client: reqwest::Client,
}

impl HttpManifestSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(MANIFEST_FETCH_TIMEOUT)
            .build()
            .context(error::ManifestClientSnafu)?;
        Ok(HttpManifestSource { client })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    #[instrument(skip(self), err)]
    async fn fetch(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(error::ManifestFetchSnafu { url })?
            .text()
            .await
            .context(error::ManifestFetchSnafu { url })
    }
}

/// Splits a multi-document YAML manifest into objects. Empty documents are skipped.
pub fn parse_manifest(manifest: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(manifest).enumerate() {
        let value =
            serde_json::Value::deserialize(document).context(error::ManifestParseSnafu { index })?;
        if value.is_null() {
            continue;
        }

        value
            .get("apiVersion")
            .and_then(serde_json::Value::as_str)
            .context(error::ManifestObjectSnafu {
                index,
                field: "apiVersion",
            })?;
        value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .context(error::ManifestObjectSnafu {
                index,
                field: "kind",
            })?;
        value
            .pointer("/metadata/name")
            .and_then(serde_json::Value::as_str)
            .context(error::ManifestObjectSnafu {
                index,
                field: "metadata.name",
            })?;

        objects.push(serde_json::from_value(value).context(error::ManifestConvertSnafu { index })?);
    }
    Ok(objects)
}

/// The group, version and kind of a manifest object, from its own apiVersion and kind.
fn manifest_kind(object: &DynamicObject) -> Option<GroupVersionKind> {
    let types = object.types.as_ref()?;
    let (group, version) = types
        .api_version
        .rsplit_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    Some(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Server-side applies every document of `manifest`, returning how many were applied.
///
/// Namespaced objects without a namespace land in `default`. Each kind is resolved once against
/// the store.
#[instrument(skip(store, manifest), err)]
pub async fn apply_manifest<S: ObjectStore + ?Sized>(store: &S, manifest: &str) -> Result<usize> {
    let objects = parse_manifest(manifest)?;
    let count = objects.len();
    let mut resolved: HashMap<(String, String, String), (ApiResource, Scope)> = HashMap::new();

    for (index, mut object) in objects.into_iter().enumerate() {
        let gvk = manifest_kind(&object).context(error::ManifestObjectSnafu {
            index,
            field: "apiVersion",
        })?;
        let kind = (gvk.group.clone(), gvk.version.clone(), gvk.kind.clone());
        let (resource, scope) = match resolved.get(&kind) {
            Some(found) => found.clone(),
            None => {
                let found = store.resolve(&gvk).await.context(error::StoreSnafu)?;
                resolved.insert(kind, found.clone());
                found
            }
        };

        match scope {
            Scope::Namespaced if object.metadata.namespace.is_none() => {
                object.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
            }
            Scope::Cluster => object.metadata.namespace = None,
            Scope::Namespaced => {}
        }
        store
            .apply(&resource, &object)
            .await
            .context(error::StoreSnafu)?;
    }
    Ok(count)
}

/// Copies the fields of a secret that carry over to another cluster: name, namespace and data.
pub fn project_credentials(secret: &Secret) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: secret.metadata.name.clone(),
            namespace: secret.metadata.namespace.clone(),
            ..Default::default()
        },
        data: secret.data.clone(),
        ..Default::default()
    }
}

async fn get_secret<S: ObjectStore + ?Sized>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<Option<Secret>> {
    let key = ObjectKey::of::<Secret>(Some(namespace), name);
    store
        .get(&key)
        .await
        .and_then(|secret| secret.map(from_dynamic).transpose())
        .context(error::StoreSnafu)
}

/// The result of bootstrapping one remote cluster.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootstrapReport {
    pub namespace: OperationResult,
    pub credentials: OperationResult,
    pub manifest_objects: usize,
}

/// Runs the remote bootstrap steps for one worker.
pub struct RemoteBootstrap<'a, S: ?Sized, C: ?Sized, M: ?Sized> {
    pub management: &'a S,
    pub connector: &'a C,
    pub manifests: &'a M,
    pub config: &'a ControllerConfig,
}

impl<'a, S, C, M> RemoteBootstrap<'a, S, C, M>
where
    S: ObjectStore + ?Sized,
    C: RemoteConnector + ?Sized,
    M: ManifestSource + ?Sized,
{
    #[instrument(skip(self), err)]
    pub async fn run(&self, namespace: &str, worker_name: &str) -> Result<BootstrapReport> {
        let credentials = &self.config.credentials;
        let secret = get_secret(self.management, &credentials.namespace, &credentials.name)
            .await?
            .context(error::CredentialsNotFoundSnafu {
                namespace: &credentials.namespace,
                name: &credentials.name,
            })?;

        let kubeconfig_name = kubeconfig_secret_name(worker_name);
        let kubeconfig = get_secret(self.management, namespace, &kubeconfig_name)
            .await?
            .context(error::RemoteNotReadySnafu {
                namespace,
                name: &kubeconfig_name,
            })?;
        let payload = kubeconfig
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_DATA_KEY))
            .context(error::MissingKubeconfigDataSnafu {
                namespace,
                name: &kubeconfig_name,
                key: KUBECONFIG_DATA_KEY,
            })?;

        let remote = self.connector.connect(&payload.0).await?;

        let namespace_result = ensure(
            &*remote,
            &remote_namespace(&credentials.namespace),
            |_: &mut Namespace| Ok(()),
        )
        .await?;

        let desired = project_credentials(&secret);
        let credentials_result = ensure(&*remote, &desired, |live: &mut Secret| {
            live.data = desired.data.clone();
            Ok(())
        })
        .await?;

        let manifest = self.manifests.fetch(&self.config.network_manifest_url).await?;
        let manifest_objects = apply_manifest(&*remote, &manifest).await?;

        event!(
            Level::INFO,
            worker = worker_name,
            manifest_objects,
            "Bootstrapped remote cluster."
        );
        Ok(BootstrapReport {
            namespace: namespace_result,
            credentials: credentials_result,
            manifest_objects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::fixtures::{connector_to, credentials, kubeconfig, secret};
    use models::store::MemoryStore;

    use maplit::btreemap;

    const CALICO: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: calico-config
  namespace: kube-system
data:
  typha_service_name: none
---
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: felixconfigurations.crd.projectcalico.org
spec:
  group: crd.projectcalico.org
"#;

    fn manifests() -> MockManifestSource {
        let mut manifests = MockManifestSource::new();
        manifests
            .expect_fetch()
            .returning(|_| Ok(CALICO.to_string()));
        manifests
    }

    #[test]
    fn test_parse_manifest_skips_empty_documents() {
        let objects = parse_manifest(CALICO).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].metadata.name.as_deref(), Some("calico-config"));
        assert_eq!(objects[0].metadata.namespace.as_deref(), Some("kube-system"));
        assert_eq!(objects[0].data["data"]["typha_service_name"], "none");

        let kind = manifest_kind(&objects[1]).unwrap();
        assert_eq!(kind.group, "apiextensions.k8s.io");
        assert_eq!(kind.version, "v1");
        assert_eq!(kind.kind, "CustomResourceDefinition");

        let kind = manifest_kind(&objects[0]).unwrap();
        assert_eq!(kind.group, "");
        assert_eq!(kind.version, "v1");
    }

    #[tokio::test]
    async fn test_apply_manifest_places_objects_by_scope() {
        let manifest = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: calico-kube-controllers
spec:
  replicas: 1
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: calico-node
  namespace: kube-system
rules: []
"#;
        let store = MemoryStore::new();
        assert_eq!(apply_manifest(&store, manifest).await.unwrap(), 2);

        let deployment = ObjectKey::new(
            ApiResource::from_gvk(&GroupVersionKind::gvk("apps", "v1", "Deployment")),
            Some("default"),
            "calico-kube-controllers",
        );
        let deployment = store.get(&deployment).await.unwrap().unwrap();
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(deployment.data["spec"]["replicas"], 1);

        let role = ObjectKey::new(
            ApiResource::from_gvk(&GroupVersionKind::gvk(
                "rbac.authorization.k8s.io",
                "v1",
                "ClusterRole",
            )),
            None,
            "calico-node",
        );
        let role = store.get(&role).await.unwrap().unwrap();
        assert_eq!(role.metadata.namespace, None);
    }

    #[test]
    fn test_parse_manifest_rejects_incomplete_documents() {
        let missing_name = "apiVersion: v1\nkind: ConfigMap\nmetadata: {}\n";
        let err = parse_manifest(missing_name).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));

        let missing_kind = "apiVersion: v1\nmetadata:\n  name: x\n";
        assert!(parse_manifest(missing_kind)
            .unwrap_err()
            .to_string()
            .contains("kind"));

        assert!(parse_manifest("- just\n- a list\n").is_err());
    }

    #[test]
    fn test_projection_drops_identity_metadata() {
        let mut live = credentials();
        live.metadata.uid = Some("uid-creds".to_string());
        live.metadata.resource_version = Some("12".to_string());
        live.metadata.labels = Some(btreemap! {"a".to_string() => "b".to_string()});
        live.type_ = Some("Opaque".to_string());

        let projected = project_credentials(&live);
        assert_eq!(projected.metadata.name, live.metadata.name);
        assert_eq!(projected.metadata.namespace, live.metadata.namespace);
        assert!(projected.metadata.uid.is_none());
        assert!(projected.metadata.resource_version.is_none());
        assert!(projected.metadata.labels.is_none());
        assert!(projected.type_.is_none());
        assert_eq!(projected.data, live.data);
    }

    #[tokio::test]
    async fn test_bootstrap_copies_credentials_and_applies_manifest() {
        let management = MemoryStore::new();
        management.insert(&credentials()).unwrap();
        management.insert(&kubeconfig()).unwrap();
        let remote = MemoryStore::new();
        let connector = connector_to(&remote);
        let manifests = manifests();
        let config = ControllerConfig::default();

        let bootstrap = RemoteBootstrap {
            management: &management,
            connector: &connector,
            manifests: &manifests,
            config: &config,
        };
        let report = bootstrap.run("default", "alpha").await.unwrap();
        assert_eq!(
            report,
            BootstrapReport {
                namespace: OperationResult::Created,
                credentials: OperationResult::Created,
                manifest_objects: 2,
            }
        );

        assert_eq!(remote.count("Namespace"), 1);
        let copied: Secret = remote
            .get_typed(Some("capz-system"), "capz-manager-bootstrap-credentials")
            .unwrap()
            .unwrap();
        assert_eq!(copied.data, credentials().data);
        assert_eq!(remote.count("ConfigMap"), 1);
        assert_eq!(remote.count("CustomResourceDefinition"), 1);

        let report = bootstrap.run("default", "alpha").await.unwrap();
        assert_eq!(report.namespace, OperationResult::Unchanged);
        assert_eq!(report.credentials, OperationResult::Unchanged);
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_is_not_ready() {
        let management = MemoryStore::new();
        management.insert(&credentials()).unwrap();
        let mut connector = MockRemoteConnector::new();
        connector.expect_connect().never();
        let mut manifests = MockManifestSource::new();
        manifests.expect_fetch().never();
        let config = ControllerConfig::default();

        let err = RemoteBootstrap {
            management: &management,
            connector: &connector,
            manifests: &manifests,
            config: &config,
        }
        .run("default", "alpha")
        .await
        .unwrap_err();
        assert_eq!(err.class(), ErrorClass::RemoteNotReady);
    }

    #[tokio::test]
    async fn test_missing_inputs_are_configuration_errors() {
        let management = MemoryStore::new();
        let connector = MockRemoteConnector::new();
        let manifests = MockManifestSource::new();
        let config = ControllerConfig::default();
        let bootstrap = RemoteBootstrap {
            management: &management,
            connector: &connector,
            manifests: &manifests,
            config: &config,
        };

        let err = bootstrap.run("default", "alpha").await.unwrap_err();
        assert!(matches!(err, error::Error::CredentialsNotFound { .. }));
        assert_eq!(err.class(), ErrorClass::Configuration);

        management.insert(&credentials()).unwrap();
        management
            .insert(&secret("default", "alpha-kubeconfig", "kubeconfig", "apiVersion: v1"))
            .unwrap();
        let err = bootstrap.run("default", "alpha").await.unwrap_err();
        assert!(matches!(err, error::Error::MissingKubeconfigData { .. }));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[tokio::test]
    async fn test_manifest_apply_failure_stops_bootstrap() {
        let management = MemoryStore::new();
        management.insert(&credentials()).unwrap();
        management.insert(&kubeconfig()).unwrap();
        let remote = MemoryStore::new();
        remote.fail_on("ConfigMap");
        let connector = connector_to(&remote);
        let manifests = manifests();
        let config = ControllerConfig::default();

        let err = RemoteBootstrap {
            management: &management,
            connector: &connector,
            manifests: &manifests,
            config: &config,
        }
        .run("default", "alpha")
        .await
        .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Upstream);
        assert_eq!(remote.count("CustomResourceDefinition"), 0);
    }
}
