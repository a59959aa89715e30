use super::{
    error::{self, Result},
    ObjectKey, ObjectStore,
};
use crate::constants::FIELD_MANAGER;

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams};
use kube::discovery::{self, Scope};
use snafu::ResultExt;
use tracing::instrument;

#[derive(Clone)]
/// Concrete implementation of the `ObjectStore` trait backed by a Kubernetes API server. This
/// implementation will almost certainly be used in any case that isn't a unit test.
pub struct KubeObjectStore {
    k8s_client: kube::client::Client,
}

impl KubeObjectStore {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        KubeObjectStore { k8s_client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.k8s_client.clone(), namespace, resource),
            None => Api::all_with(self.k8s_client.clone(), resource),
        }
    }

    fn api_for(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<(Api<DynamicObject>, ObjectKey)> {
        let key = ObjectKey::for_object(resource, object)?;
        Ok((self.api(resource, key.namespace.as_deref()), key))
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        self.api(&key.resource, key.namespace.as_deref())
            .get_opt(&key.name)
            .await
            .context(error::GetObjectSnafu {
                kind: key.resource.kind.clone(),
                name: key.name.clone(),
            })
    }

    #[instrument(skip(self, object), fields(kind = %resource.kind), err)]
    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let (api, key) = self.api_for(resource, object)?;
        api.create(&PostParams::default(), object)
            .await
            .context(error::CreateObjectSnafu {
                kind: resource.kind.clone(),
                name: key.name,
            })
    }

    #[instrument(skip(self, object), fields(kind = %resource.kind), err)]
    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let (api, key) = self.api_for(resource, object)?;
        api.replace(&key.name, &PostParams::default(), object)
            .await
            .context(error::ReplaceObjectSnafu {
                kind: resource.kind.clone(),
                name: key.name.clone(),
            })
    }

    #[instrument(skip(self, object), fields(kind = %resource.kind), err)]
    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let (api, key) = self.api_for(resource, object)?;
        let body = serde_json::to_vec(object).context(error::SerializeObjectSnafu {
            kind: resource.kind.clone(),
            name: key.name.clone(),
        })?;
        api.replace_status(&key.name, &PostParams::default(), body)
            .await
            .context(error::ReplaceStatusSnafu {
                kind: resource.kind.clone(),
                name: key.name.clone(),
            })
    }

    #[instrument(skip(self, object), fields(kind = %resource.kind), err)]
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        let (api, key) = self.api_for(resource, object)?;
        api.patch(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(object),
        )
        .await
        .context(error::ApplyObjectSnafu {
            kind: resource.kind.clone(),
            name: key.name.clone(),
        })
    }

    #[instrument(skip(self), fields(kind = %gvk.kind), err)]
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)> {
        let (resource, capabilities) = discovery::pinned_kind(&self.k8s_client, gvk)
            .await
            .context(error::ResolveKindSnafu {
                kind: gvk.kind.clone(),
            })?;
        Ok((resource, capabilities.scope))
    }
}
