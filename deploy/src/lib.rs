/*!
Rendered deployment manifests for carp. The build script writes them under `tests/golden` from the
typed definitions in `carp-models`.
!*/
use std::path::PathBuf;

/// Rendered `Worker` and `ManagedCluster` custom resource definitions.
pub const CRD_MANIFEST: &str = "custom-resource-definition.yaml";
/// Rendered namespace, RBAC and deployment of the controller.
pub const CONTROLLER_MANIFEST: &str = "carp-controller.yaml";

/// Path of a rendered manifest.
pub fn golden_path(manifest: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("golden")
        .join(manifest)
}
