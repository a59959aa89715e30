use super::{error, KUBERNETES_VERSION_RE};
use crate::constants::{DEFAULT_KUBERNETES_VERSION, DEFAULT_REPLICAS};

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fmt;
use validator::Validate;

/// The lifecycle phase reported on a `Worker`.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Default, Eq, PartialEq, JsonSchema)]
pub enum WorkerPhase {
    /// The stack is being converged, or the last pass failed.
    #[default]
    Pending,
    /// Every stage of the last pass succeeded.
    Running,
    /// The worker has been marked for deletion.
    Terminating,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Terminating => "Terminating",
        };
        f.write_str(phase)
    }
}

/// The `WorkerSpec` describes one nested-cluster stack: where it runs, how many control-plane
/// machines it has, which Kubernetes version it runs, and how much workload it can host.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Eq, PartialEq, JsonSchema, Validate)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "infrastructure.cluster.x-k8s.io",
    kind = "Worker",
    namespaced,
    plural = "workers",
    singular = "worker",
    status = "WorkerStatus",
    version = "v1alpha1",
    printcolumn = r#"{"name":"Location", "type":"string", "jsonPath":".spec.location"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableCapacity"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Cloud region the stack is provisioned in.
    #[validate(length(min = 1))]
    pub location: String,
    /// Number of control-plane machines, also used for the node pool.
    #[serde(default = "default_replicas")]
    #[validate(range(min = 1))]
    pub replicas: i32,
    /// Declared workload capacity.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub capacity: i32,
    /// Kubernetes version of the control plane and nodes.
    #[serde(default = "default_version")]
    #[validate(regex = "KUBERNETES_VERSION_RE")]
    pub version: String,
}

fn default_replicas() -> i32 {
    DEFAULT_REPLICAS
}

fn default_version() -> String {
    DEFAULT_KUBERNETES_VERSION.to_string()
}

impl Default for WorkerSpec {
    fn default() -> Self {
        WorkerSpec {
            location: String::new(),
            replicas: default_replicas(),
            capacity: 0,
            version: default_version(),
        }
    }
}

impl Worker {
    /// Returns whether the worker has been marked for deletion.
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// `WorkerStatus` is written only by the worker reconciler.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    #[serde(default)]
    pub phase: WorkerPhase,
    /// Initialized once to the declared capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_scheduled_time: Option<String>,
}

impl WorkerStatus {
    pub fn new(
        phase: WorkerPhase,
        available_capacity: Option<i32>,
        last_scheduled_time: Option<DateTime<Utc>>,
    ) -> Self {
        WorkerStatus {
            phase,
            available_capacity,
            last_scheduled_time: last_scheduled_time.map(|ts| ts.to_rfc3339()),
        }
    }

    /// Records the initial capacity allocation and when it happened.
    pub fn schedule(&mut self, capacity: i32, now: DateTime<Utc>) {
        self.available_capacity = Some(capacity);
        self.last_scheduled_time = Some(now.to_rfc3339());
    }

    /// JsonSchema cannot appropriately handle DateTime objects. This accessor returns the last
    /// scheduled time as a DateTime.
    pub fn last_scheduled_time(&self) -> error::Result<Option<DateTime<Utc>>> {
        self.last_scheduled_time
            .as_ref()
            .map(|ts_str| {
                DateTime::parse_from_rfc3339(ts_str)
                    // Convert `DateTime<FixedOffset>` into `DateTime<Utc>`
                    .map(|ts| ts.into())
                    .context(error::TimestampFormatSnafu {
                        timestamp: ts_str.clone(),
                    })
            })
            .transpose()
    }
}
