//! The `Worker` custom resource: one nested-cluster stack to provision.
mod crd;
pub mod error;

pub use self::crd::{Worker, WorkerPhase, WorkerSpec, WorkerStatus};
pub use self::error::{Error as WorkerError, Result};

use crate::constants::KUBECONFIG_SECRET_SUFFIX;

use lazy_static::lazy_static;

pub const K8S_WORKER_KIND: &str = "Worker";
pub const K8S_WORKER_PLURAL: &str = "workers";
pub const K8S_WORKER_STATUS: &str = "workers/status";

lazy_static! {
    // Kubernetes release versions as accepted by kubeadm, e.g. `v1.17.4`.
    pub(crate) static ref KUBERNETES_VERSION_RE: regex::Regex =
        regex::Regex::new(r"^v(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:[-+][0-9A-Za-z.-]+)?$")
            .expect("Invalid regex literal.");
}

/// Returns the name of the secret in which the remote cluster's kubeconfig is published.
pub fn kubeconfig_secret_name(worker_name: &str) -> String {
    format!("{}{}", worker_name, KUBECONFIG_SECRET_SUFFIX)
}
