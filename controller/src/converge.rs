use crate::error::{self, Result};
use models::store::{api_resource, from_dynamic, to_dynamic, ObjectKey, ObjectStore};

use kube::{Resource, ResourceExt};
use serde::{de::DeserializeOwned, Serialize};
use snafu::{OptionExt, ResultExt};
use std::fmt;
use tracing::{event, instrument, Level};

/// The effect a converge call had on the stored object.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    /// Whether the call wrote to the store.
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        };
        f.write_str(result)
    }
}

/// Ensures the object identified by `desired` exists and has been passed through `mutate`.
///
/// A missing object is created from `desired` after `mutate` has been applied to it. An existing
/// object is fetched, mutated in place and written back only if mutation changed it. Objects are
/// never deleted.
#[instrument(skip(store, desired, mutate), fields(kind = %K::kind(&()), name = %desired.name_any()), err)]
pub async fn ensure<S, K, F>(store: &S, desired: &K, mutate: F) -> Result<OperationResult>
where
    S: ObjectStore + ?Sized,
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone,
    F: FnOnce(&mut K) -> Result<()>,
{
    let kind = K::kind(&()).to_string();
    let name = desired
        .meta()
        .name
        .clone()
        .context(error::UnnamedObjectSnafu { kind: kind.clone() })?;
    let resource = api_resource::<K>();
    let key = ObjectKey::new(resource.clone(), desired.meta().namespace.as_deref(), &name);

    let live = store.get(&key).await.context(error::StoreSnafu)?;
    match live {
        None => {
            let mut object = desired.clone();
            mutate(&mut object)?;
            let object = to_dynamic(&object).context(error::StoreSnafu)?;
            store
                .create(&resource, &object)
                .await
                .context(error::StoreSnafu)?;
            event!(Level::INFO, %key, "Created object.");
            Ok(OperationResult::Created)
        }
        Some(live) => {
            let mut object: K = from_dynamic(live).context(error::StoreSnafu)?;
            let before = serde_json::to_value(&object).context(error::CompareObjectSnafu {
                kind: kind.clone(),
                name: name.clone(),
            })?;
            mutate(&mut object)?;
            let after = serde_json::to_value(&object).context(error::CompareObjectSnafu {
                kind: kind.clone(),
                name: name.clone(),
            })?;

            if before == after {
                event!(Level::DEBUG, %key, "Object already matches its desired form.");
                return Ok(OperationResult::Unchanged);
            }

            let object = to_dynamic(&object).context(error::StoreSnafu)?;
            store
                .replace(&resource, &object)
                .await
                .context(error::StoreSnafu)?;
            event!(Level::INFO, %key, "Updated object.");
            Ok(OperationResult::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::capi::{MachineDeployment, MachineDeploymentSpec};
    use models::store::{MemoryStore, MockObjectStore, StoreError};

    use kube::error::ErrorResponse;

    fn machine_deployment(replicas: i32) -> MachineDeployment {
        let mut md = MachineDeployment::new(
            "alpha",
            MachineDeploymentSpec {
                cluster_name: "alpha".to_string(),
                replicas: Some(replicas),
                ..Default::default()
            },
        );
        md.metadata.namespace = Some("default".to_string());
        md
    }

    fn set_replicas(replicas: i32) -> impl FnOnce(&mut MachineDeployment) -> Result<()> {
        move |md| {
            md.spec.replicas = Some(replicas);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_update_unchanged() {
        let store = MemoryStore::new();
        let desired = machine_deployment(1);

        let result = ensure(&store, &desired, set_replicas(1)).await.unwrap();
        assert_eq!(result, OperationResult::Created);

        let result = ensure(&store, &desired, set_replicas(1)).await.unwrap();
        assert_eq!(result, OperationResult::Unchanged);
        assert!(!result.changed());

        let result = ensure(&store, &desired, set_replicas(2)).await.unwrap();
        assert_eq!(result, OperationResult::Updated);

        let stored: MachineDeployment = store
            .get_typed(Some("default"), "alpha")
            .unwrap()
            .unwrap();
        assert_eq!(stored.spec.replicas, Some(2));
        assert_eq!(store.count("MachineDeployment"), 1);
    }

    #[tokio::test]
    async fn test_mutate_sees_live_object() {
        let store = MemoryStore::new();
        let mut live = machine_deployment(5);
        live.metadata.labels = Some([("team".to_string(), "red".to_string())].into());
        store.insert(&live).unwrap();

        let desired = machine_deployment(1);
        let result = ensure(&store, &desired, |md: &mut MachineDeployment| {
            assert_eq!(md.spec.replicas, Some(5));
            md.spec.replicas = Some(1);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(result, OperationResult::Updated);

        let stored: MachineDeployment = store
            .get_typed(Some("default"), "alpha")
            .unwrap()
            .unwrap();
        assert_eq!(stored.labels().get("team").map(String::as_str), Some("red"));
        assert_eq!(stored.spec.replicas, Some(1));
    }

    #[tokio::test]
    async fn test_mutate_error_writes_nothing() {
        let store = MemoryStore::new();
        let desired = machine_deployment(1);

        let result = ensure(&store, &desired, |_: &mut MachineDeployment| {
            error::MissingOwnerUidSnafu { name: "alpha" }.fail()
        })
        .await;
        assert!(result.is_err());
        assert_eq!(store.count("MachineDeployment"), 0);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut store = MockObjectStore::new();
        store.expect_get().times(1).returning(|key| {
            Err(StoreError::GetObject {
                kind: key.resource.kind.clone(),
                name: key.name.clone(),
                source: kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: "unavailable".to_string(),
                    reason: "ServiceUnavailable".to_string(),
                    code: 503,
                }),
            })
        });
        store.expect_create().never();
        store.expect_replace().never();

        let err = ensure(&store, &machine_deployment(1), set_replicas(1))
            .await
            .unwrap_err();
        assert!(matches!(err, error::Error::Store { .. }));
    }

    #[tokio::test]
    async fn test_unnamed_desired_object() {
        let store = MockObjectStore::new();
        let mut desired = machine_deployment(1);
        desired.metadata.name = None;

        let err = ensure(&store, &desired, set_replicas(1)).await.unwrap_err();
        assert!(matches!(err, error::Error::UnnamedObject { .. }));
    }
}
