use crate::pipeline::Stage;
use models::store::StoreError;

use snafu::Snafu;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// How the driver should treat a failed pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// The remote cluster has not published its kubeconfig yet. Expected; retry later.
    RemoteNotReady,
    /// An input the pass depends on is malformed or missing.
    Configuration,
    /// The management or remote API server, or the manifest host, failed a request.
    Upstream,
    /// Every stage succeeded but the worker's status could not be written.
    StatusPersistence,
}

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Stage '{}' failed: {}", stage, source))]
    Stage { stage: Stage, source: Box<Error> },

    #[snafu(display("Worker '{}' has an invalid spec: {}", name, source))]
    InvalidWorkerSpec {
        name: String,
        source: validator::ValidationErrors,
    },

    #[snafu(display("Worker is missing '{}'", field))]
    MissingWorkerField { field: &'static str },

    #[snafu(display("Unable to build cloud provider config: '{}'", source))]
    CloudConfig { source: serde_json::Error },

    #[snafu(display("Unable to compare {} '{}' with its desired form: '{}'", kind, name, source))]
    CompareObject {
        kind: String,
        name: String,
        source: serde_json::Error,
    },

    #[snafu(display("Desired {} has no name", kind))]
    UnnamedObject { kind: String },

    #[snafu(display("{}", source))]
    Store { source: StoreError },

    #[snafu(display(
        "{} '{}' is already controlled by {} '{}'",
        kind,
        name,
        owner_kind,
        owner_name
    ))]
    OwnerConflict {
        kind: String,
        name: String,
        owner_kind: String,
        owner_name: String,
    },

    #[snafu(display("Worker '{}' has no uid and cannot own objects", name))]
    MissingOwnerUid { name: String },

    #[snafu(display("Credential secret '{}/{}' does not exist", namespace, name))]
    CredentialsNotFound { namespace: String, name: String },

    #[snafu(display(
        "Kubeconfig secret '{}/{}' does not exist yet; the remote cluster is not ready",
        namespace,
        name
    ))]
    RemoteNotReady { namespace: String, name: String },

    #[snafu(display("Secret '{}/{}' is missing data key '{}'", namespace, name, key))]
    MissingKubeconfigData {
        namespace: String,
        name: String,
        key: String,
    },

    #[snafu(display("Remote kubeconfig is not valid UTF-8: '{}'", source))]
    KubeconfigEncoding { source: std::str::Utf8Error },

    #[snafu(display("Unable to load remote kubeconfig: '{}'", source))]
    KubeconfigLoad {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to create remote client: '{}'", source))]
    RemoteClient { source: kube::Error },

    #[snafu(display("Unable to create manifest HTTP client: '{}'", source))]
    ManifestClient { source: reqwest::Error },

    #[snafu(display("Unable to fetch manifest '{}': '{}'", url, source))]
    ManifestFetch { url: String, source: reqwest::Error },

    #[snafu(display("Unable to parse manifest document {}: '{}'", index, source))]
    ManifestParse {
        index: usize,
        source: serde_yaml::Error,
    },

    #[snafu(display("Manifest document {} is not a Kubernetes object: missing '{}'", index, field))]
    ManifestObject { index: usize, field: &'static str },

    #[snafu(display("Unable to convert manifest document {}: '{}'", index, source))]
    ManifestConvert {
        index: usize,
        source: serde_json::Error,
    },

    #[snafu(display("Pipeline stages form a cycle: {}", stages))]
    StageCycle { stages: String },

    #[snafu(display("Unable to persist worker status: {}", source))]
    StatusPersistence { source: StoreError },
}

impl Error {
    /// Classifies the error for requeue and reporting purposes.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Stage { source, .. } => source.class(),
            Self::RemoteNotReady { .. } => ErrorClass::RemoteNotReady,
            Self::InvalidWorkerSpec { .. }
            | Self::MissingWorkerField { .. }
            | Self::UnnamedObject { .. }
            | Self::OwnerConflict { .. }
            | Self::MissingOwnerUid { .. }
            | Self::CredentialsNotFound { .. }
            | Self::MissingKubeconfigData { .. }
            | Self::KubeconfigEncoding { .. }
            | Self::KubeconfigLoad { .. }
            | Self::StageCycle { .. } => ErrorClass::Configuration,
            Self::StatusPersistence { .. } => ErrorClass::StatusPersistence,
            Self::CloudConfig { .. }
            | Self::CompareObject { .. }
            | Self::Store { .. }
            | Self::RemoteClient { .. }
            | Self::ManifestClient { .. }
            | Self::ManifestFetch { .. }
            | Self::ManifestParse { .. }
            | Self::ManifestObject { .. }
            | Self::ManifestConvert { .. } => ErrorClass::Upstream,
        }
    }

    /// The stage the error was raised in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
