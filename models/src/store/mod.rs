/*!
The object store is the only path by which carp reads or writes the Kubernetes API. Stores are
untyped: they move [`DynamicObject`]s addressed by an [`ApiResource`], so one implementation
serves every kind carp touches in the management cluster and in remote clusters alike.
Typed callers convert with [`to_dynamic`] and [`from_dynamic`].
!*/
pub mod error;
mod client;
#[cfg(any(test, feature = "test-util"))]
mod memory;

pub use self::error::{Error as StoreError, Result};
pub use self::client::KubeObjectStore;
#[cfg(any(test, feature = "test-util"))]
pub use self::memory::MemoryStore;

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::Scope;
use kube::{Resource, ResourceExt};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use snafu::{OptionExt, ResultExt};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "mockall")]
use mockall::{mock, predicate::*};

/// Identifies one object: its kind, its namespace (`None` for cluster-scoped kinds), and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    pub resource: ApiResource,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(resource: ApiResource, namespace: Option<&str>, name: &str) -> Self {
        ObjectKey {
            resource,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// The key of an object of the typed kind `K`.
    pub fn of<K: Resource<DynamicType = ()>>(namespace: Option<&str>, name: &str) -> Self {
        Self::new(api_resource::<K>(), namespace, name)
    }

    /// The key addressing `object`, which must be named.
    pub fn for_object(resource: &ApiResource, object: &DynamicObject) -> Result<Self> {
        let name = object
            .metadata
            .name
            .as_deref()
            .context(error::MissingNameSnafu {
                kind: resource.kind.clone(),
            })?;
        Ok(Self::new(
            resource.clone(),
            object.metadata.namespace.as_deref(),
            name,
        ))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.resource.kind, namespace, self.name),
            None => write!(f, "{} {}", self.resource.kind, self.name),
        }
    }
}

#[async_trait]
/// A trait providing an interface to read and write Kubernetes objects. This is provided as a
/// trait in order to allow mocks and in-memory stores to be used for testing purposes.
pub trait ObjectStore: Send + Sync {
    /// Fetches an object, returning `None` if it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>>;
    /// Creates an object. Fails if it already exists.
    async fn create(&self, resource: &ApiResource, object: &DynamicObject)
        -> Result<DynamicObject>;
    /// Replaces an existing object wholesale. The object's resourceVersion, when present, is
    /// checked by the server.
    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject>;
    /// Replaces the status subresource of an existing object.
    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject>;
    /// Server-side applies an object, creating it if needed.
    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject>;
    /// Looks up the resource serving `gvk` and whether its objects are namespaced.
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)>;
}

#[cfg(feature = "mockall")]
mock! {
    /// A Mock ObjectStore for use in tests.
    pub ObjectStore {}
    #[async_trait]
    impl ObjectStore for ObjectStore {
        async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>>;
        async fn create(&self, resource: &ApiResource, object: &DynamicObject)
            -> Result<DynamicObject>;
        async fn replace(&self, resource: &ApiResource, object: &DynamicObject)
            -> Result<DynamicObject>;
        async fn replace_status(&self, resource: &ApiResource, object: &DynamicObject)
            -> Result<DynamicObject>;
        async fn apply(&self, resource: &ApiResource, object: &DynamicObject)
            -> Result<DynamicObject>;
        async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)>;
    }
}

#[async_trait]
impl<T> ObjectStore for Arc<T>
where
    T: ObjectStore + ?Sized,
{
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>> {
        (**self).get(key).await
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        (**self).create(resource, object).await
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        (**self).replace(resource, object).await
    }

    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        (**self).replace_status(resource, object).await
    }

    async fn apply(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject> {
        (**self).apply(resource, object).await
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)> {
        (**self).resolve(gvk).await
    }
}

/// The erased `ApiResource` of a typed kind.
pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

/// Converts a typed object into a `DynamicObject`, keeping its apiVersion and kind.
pub fn to_dynamic<K>(object: &K) -> Result<DynamicObject>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let kind = K::kind(&()).to_string();
    let name = object.name_any();
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .context(error::SerializeObjectSnafu { kind, name })
}

/// Converts a `DynamicObject` into the typed kind `K`.
pub fn from_dynamic<K>(object: DynamicObject) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let kind = K::kind(&()).to_string();
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .context(error::ConvertObjectSnafu { kind })
}
