//! Objects shared by the controller's tests.
use crate::config::{CloudSettings, ControllerConfig};
use crate::remote::{MockManifestSource, MockRemoteConnector};
use models::store::{from_dynamic, MemoryStore, ObjectStore};
use models::worker::{Worker, WorkerSpec};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use maplit::btreemap;

pub(crate) const KUBECONFIG: &str = "apiVersion: v1\nkind: Config\n";

pub(crate) const MANIFEST: &str = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: calico-node
  namespace: kube-system
---
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: calico-node
  namespace: kube-system
spec:
  selector:
    matchLabels:
      k8s-app: calico-node
"#;

pub(crate) fn config() -> ControllerConfig {
    ControllerConfig {
        cloud: CloudSettings {
            environment: "AzurePublicCloud".to_string(),
            tenant_id: "tenant".to_string(),
            subscription_id: "subscription".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        },
        ..Default::default()
    }
}

pub(crate) fn worker_spec() -> WorkerSpec {
    WorkerSpec {
        location: "westus2".to_string(),
        replicas: 3,
        capacity: 10,
        version: "v1.17.4".to_string(),
    }
}

/// Stores a worker named `alpha` and returns it as the API server would, with a uid.
pub(crate) fn stored_worker(store: &MemoryStore, spec: WorkerSpec) -> Worker {
    let mut worker = Worker::new("alpha", spec);
    worker.metadata.namespace = Some("default".to_string());
    let stored = store.insert(&worker).unwrap();
    from_dynamic(stored).unwrap()
}

/// Fetches the latest copy of the worker stored by [`stored_worker`].
pub(crate) async fn reload_worker(store: &MemoryStore) -> Worker {
    let key = models::store::ObjectKey::of::<Worker>(Some("default"), "alpha");
    from_dynamic(store.get(&key).await.unwrap().unwrap()).unwrap()
}

pub(crate) fn secret(namespace: &str, name: &str, key: &str, value: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(btreemap! {
            key.to_string() => ByteString(value.as_bytes().to_vec()),
        }),
        ..Default::default()
    }
}

pub(crate) fn credentials() -> Secret {
    secret(
        "capz-system",
        "capz-manager-bootstrap-credentials",
        "client-secret",
        "hunter2",
    )
}

pub(crate) fn kubeconfig() -> Secret {
    secret("default", "alpha-kubeconfig", "value", KUBECONFIG)
}

/// A connector which hands out `remote` for any kubeconfig.
pub(crate) fn connector_to(remote: &MemoryStore) -> MockRemoteConnector {
    let remote = remote.clone();
    let mut connector = MockRemoteConnector::new();
    connector
        .expect_connect()
        .returning(move |_| Ok(Box::new(remote.clone()) as Box<dyn ObjectStore>));
    connector
}

/// A connector which must never be used.
pub(crate) fn unreachable_connector() -> MockRemoteConnector {
    let mut connector = MockRemoteConnector::new();
    connector.expect_connect().never();
    connector
}

pub(crate) fn manifests() -> MockManifestSource {
    let mut manifests = MockManifestSource::new();
    manifests
        .expect_fetch()
        .returning(|_| Ok(MANIFEST.to_string()));
    manifests
}
