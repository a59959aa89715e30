use crate::error::{self, Result};
use models::worker::Worker;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use snafu::OptionExt;

/// Builds the controller reference a worker places on the objects it owns.
pub fn controller_reference(worker: &Worker) -> Result<OwnerReference> {
    let owner = worker
        .controller_owner_ref(&())
        .context(error::MissingOwnerUidSnafu {
            name: worker.name_any(),
        })?;
    Ok(OwnerReference {
        block_owner_deletion: Some(true),
        ..owner
    })
}

/// Marks `owner` as the controller of `object`.
///
/// An existing controller reference with the same uid is refreshed. A controller reference held
/// by any other owner is left untouched and reported as a conflict. References that do not claim
/// control are kept.
pub fn bind_controller<K>(object: &mut K, owner: &OwnerReference) -> Result<()>
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&()).to_string();
    let name = object.meta().name.clone().unwrap_or_default();
    let references = object.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = references
        .iter()
        .find(|reference| reference.controller == Some(true) && reference.uid != owner.uid)
    {
        return error::OwnerConflictSnafu {
            kind,
            name,
            owner_kind: existing.kind.clone(),
            owner_name: existing.name.clone(),
        }
        .fail();
    }

    match references
        .iter()
        .position(|reference| reference.uid == owner.uid)
    {
        Some(index) => references[index] = owner.clone(),
        None => references.push(owner.clone()),
    }
    Ok(())
}
