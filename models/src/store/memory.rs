use super::{
    error::{self, Result},
    api_resource, from_dynamic, to_dynamic, ObjectKey, ObjectStore,
};

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::Scope;
use kube::error::ErrorResponse;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use snafu::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

type StoreKey = (String, Option<String>, String);

/// Kinds whose objects are cluster-scoped. Every other kind resolves as namespaced.
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

#[derive(Default)]
struct State {
    objects: BTreeMap<StoreKey, DynamicObject>,
    failing_kinds: BTreeSet<String>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// An `ObjectStore` which keeps objects in memory, assigning uids and resource versions the way
/// an API server would. Clones share the same objects.
///
/// Writes to kinds registered with [`MemoryStore::fail_on`] return a server error.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn store_key(key: &ObjectKey) -> StoreKey {
    (
        format!("{}/{}", key.resource.api_version, key.resource.kind),
        key.namespace.clone(),
        key.name.clone(),
    )
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread may poison the lock; the map is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every subsequent request for `kind` fail with an internal error.
    pub fn fail_on(&self, kind: &str) {
        self.lock().failing_kinds.insert(kind.to_string());
    }

    /// Removes all failures registered with [`MemoryStore::fail_on`].
    pub fn clear_failures(&self) {
        self.lock().failing_kinds.clear();
    }

    /// Stores a typed object directly, as if created by another client.
    pub fn insert<K>(&self, object: &K) -> Result<DynamicObject>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let resource = api_resource::<K>();
        let mut dynamic = to_dynamic(object)?;
        let key = ObjectKey::for_object(&resource, &dynamic)?;
        let mut state = self.lock();
        if dynamic.metadata.uid.is_none() {
            dynamic.metadata.uid = Some(format!("uid-{}", key.name));
        }
        dynamic.metadata.resource_version = Some(state.next_revision());
        state.objects.insert(store_key(&key), dynamic.clone());
        Ok(dynamic)
    }

    /// Fetches a typed object, if present.
    pub fn get_typed<K>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let key = ObjectKey::of::<K>(namespace, name);
        let object = self.lock().objects.get(&store_key(&key)).cloned();
        object.map(from_dynamic).transpose()
    }

    /// Number of stored objects of the given kind.
    pub fn count(&self, kind: &str) -> usize {
        self.lock()
            .objects
            .values()
            .filter(|object| object.types.as_ref().map(|t| t.kind.as_str()) == Some(kind))
            .count()
    }

    fn check_failure(
        state: &State,
        resource: &ApiResource,
        name: &str,
    ) -> std::result::Result<(), kube::Error> {
        if state.failing_kinds.contains(&resource.kind) {
            return Err(api_error(
                500,
                "InternalError",
                format!("injected failure for {} '{}'", resource.kind, name),
            ));
        }
        Ok(())
    }

    fn with_types(resource: &ApiResource, object: &DynamicObject) -> DynamicObject {
        let mut object = object.clone();
        if object.types.is_none() {
            object.types = Some(kube::core::TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
        }
        object
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        let state = self.lock();
        Self::check_failure(&state, &key.resource, &key.name).context(error::GetObjectSnafu {
            kind: key.resource.kind.clone(),
            name: key.name.clone(),
        })?;
        Ok(state.objects.get(&store_key(key)).cloned())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let key = ObjectKey::for_object(resource, object)?;
        let context = error::CreateObjectSnafu {
            kind: resource.kind.clone(),
            name: key.name.clone(),
        };
        let mut state = self.lock();
        Self::check_failure(&state, resource, &key.name).context(context.clone())?;
        if state.objects.contains_key(&store_key(&key)) {
            return Err(api_error(409, "AlreadyExists", format!("{} already exists", key)))
                .context(context);
        }

        let mut created = Self::with_types(resource, object);
        created.metadata.uid = Some(format!("uid-{}-{}", key.name, state.revision + 1));
        created.metadata.resource_version = Some(state.next_revision());
        state.objects.insert(store_key(&key), created.clone());
        Ok(created)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let key = ObjectKey::for_object(resource, object)?;
        let context = error::ReplaceObjectSnafu {
            kind: resource.kind.clone(),
            name: key.name.clone(),
        };
        let mut state = self.lock();
        Self::check_failure(&state, resource, &key.name).context(context.clone())?;
        let live = match state.objects.get(&store_key(&key)) {
            Some(live) => live.clone(),
            None => {
                return Err(api_error(404, "NotFound", format!("{} not found", key)))
                    .context(context)
            }
        };
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != live.metadata.resource_version
        {
            return Err(api_error(409, "Conflict", format!("{} has been modified", key)))
                .context(context);
        }

        let mut replaced = Self::with_types(resource, object);
        replaced.metadata.uid = live.metadata.uid.clone();
        // Status is only written through the status subresource.
        match live.data.get("status") {
            Some(status) => {
                replaced.data["status"] = status.clone();
            }
            None => {
                if let Some(data) = replaced.data.as_object_mut() {
                    data.remove("status");
                }
            }
        }
        replaced.metadata.resource_version = Some(state.next_revision());
        state.objects.insert(store_key(&key), replaced.clone());
        Ok(replaced)
    }

    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let key = ObjectKey::for_object(resource, object)?;
        let context = error::ReplaceStatusSnafu {
            kind: resource.kind.clone(),
            name: key.name.clone(),
        };
        let mut state = self.lock();
        Self::check_failure(&state, resource, &key.name).context(context.clone())?;
        let mut live = match state.objects.get(&store_key(&key)) {
            Some(live) => live.clone(),
            None => {
                return Err(api_error(404, "NotFound", format!("{} not found", key)))
                    .context(context)
            }
        };

        live.data["status"] = object
            .data
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        live.metadata.resource_version = Some(state.next_revision());
        state.objects.insert(store_key(&key), live.clone());
        Ok(live)
    }

    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::for_object(resource, object)?;
        let mut state = self.lock();
        Self::check_failure(&state, resource, &key.name).context(error::ApplyObjectSnafu {
            kind: resource.kind.clone(),
            name: key.name.clone(),
        })?;

        let mut applied = Self::with_types(resource, object);
        applied.metadata.uid = match state.objects.get(&store_key(&key)) {
            Some(live) => live.metadata.uid.clone(),
            None => Some(format!("uid-{}-{}", key.name, state.revision + 1)),
        };
        applied.metadata.resource_version = Some(state.next_revision());
        state.objects.insert(store_key(&key), applied.clone());
        Ok(applied)
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)> {
        let scope = if CLUSTER_SCOPED_KINDS.contains(&gvk.kind.as_str()) {
            Scope::Cluster
        } else {
            Scope::Namespaced
        };
        Ok((ApiResource::from_gvk(gvk), scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_conflict() {
        let store = MemoryStore::new();
        let resource = api_resource::<Secret>();
        let object = to_dynamic(&secret("creds")).unwrap();

        let created = store.create(&resource, &object).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let err = store.create(&resource, &object).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_replace_checks_existence_and_revision() {
        let store = MemoryStore::new();
        let resource = api_resource::<Secret>();
        let object = to_dynamic(&secret("creds")).unwrap();

        let err = store.replace(&resource, &object).await.unwrap_err();
        assert_eq!(err.api_code(), Some(404));

        let mut created = store.create(&resource, &object).await.unwrap();
        let replaced = store.replace(&resource, &created).await.unwrap();
        assert_eq!(replaced.metadata.uid, created.metadata.uid);
        assert_eq!(replaced.metadata.resource_version.as_deref(), Some("2"));

        // `created` still carries revision 1.
        created.metadata.labels = Some(Default::default());
        assert!(store.replace(&resource, &created).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.fail_on("Secret");
        let key = ObjectKey::of::<Secret>(Some("default"), "creds");
        assert_eq!(store.get(&key).await.unwrap_err().api_code(), Some(500));

        store.clear_failures();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_scope() {
        let store = MemoryStore::new();
        let (resource, scope) = store
            .resolve(&GroupVersionKind::gvk("rbac.authorization.k8s.io", "v1", "ClusterRole"))
            .await
            .unwrap();
        assert_eq!(resource.plural, "clusterroles");
        assert_eq!(scope, Scope::Cluster);

        let (_, scope) = store
            .resolve(&GroupVersionKind::gvk("apps", "v1", "DaemonSet"))
            .await
            .unwrap();
        assert_eq!(scope, Scope::Namespaced);
    }
}
