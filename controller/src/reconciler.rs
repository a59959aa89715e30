use crate::config::ControllerConfig;
use crate::error::{self, Result};
use crate::metrics::ControllerMetrics;
use crate::pipeline::{PassReport, Pipeline};
use crate::remote::{ManifestSource, RemoteConnector};
use crate::statemachine::{next_status, PassOutcome};
use models::store::{api_resource, to_dynamic, ObjectStore};
use models::worker::{Worker, WorkerStatus};

use chrono::Utc;
use kube::ResourceExt;
use snafu::ResultExt;
use tracing::{event, instrument, Level};
use validator::Validate;

/// Reconciles `Worker` objects: converges each worker's stack and records the result in its
/// status.
pub struct WorkerReconciler<S, C, M> {
    store: S,
    connector: C,
    manifests: M,
    config: ControllerConfig,
    metrics: ControllerMetrics,
}

impl<S, C, M> WorkerReconciler<S, C, M>
where
    S: ObjectStore,
    C: RemoteConnector,
    M: ManifestSource,
{
    pub fn new(
        store: S,
        connector: C,
        manifests: M,
        config: ControllerConfig,
        metrics: ControllerMetrics,
    ) -> Self {
        WorkerReconciler {
            store,
            connector,
            manifests,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Runs one pass for `worker` and persists its next status.
    ///
    /// Status persistence runs whether or not the pass succeeded, but a failed pass leaves the
    /// status as it was. When both fail, the pass error is returned.
    #[instrument(skip(self, worker), fields(worker = %worker.name_any()), err)]
    pub async fn reconcile(&self, worker: &Worker) -> Result<PassReport> {
        let _timer = self.metrics.start_pass();

        let (outcome, pass) = if worker.is_terminating() {
            event!(Level::INFO, "Worker is being deleted; skipping convergence.");
            (PassOutcome::Deleting, Ok(PassReport::default()))
        } else {
            let pass = self.converge(worker).await;
            let outcome = match pass {
                Ok(_) => PassOutcome::Converged,
                Err(_) => PassOutcome::Failed,
            };
            (outcome, pass)
        };

        let status = next_status(worker.status.as_ref(), &worker.spec, outcome, Utc::now());
        let persisted = self.persist_status(worker, status).await;

        let result = match (pass, persisted) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(report), Ok(())) => Ok(report),
        };
        self.metrics.record_pass(&result);
        result
    }

    async fn converge(&self, worker: &Worker) -> Result<PassReport> {
        worker
            .spec
            .validate()
            .context(error::InvalidWorkerSpecSnafu {
                name: worker.name_any(),
            })?;

        let report = Pipeline {
            store: &self.store,
            connector: &self.connector,
            manifests: &self.manifests,
            config: &self.config,
        }
        .run(worker)
        .await?;

        event!(
            Level::INFO,
            changed = report.changed(),
            "Worker stack converged."
        );
        Ok(report)
    }

    /// Writes `status` unless the worker already carries it.
    #[instrument(skip(self, worker), err)]
    async fn persist_status(&self, worker: &Worker, status: Option<WorkerStatus>) -> Result<()> {
        let status = match status {
            Some(status) if worker.status.as_ref() != Some(&status) => status,
            _ => return Ok(()),
        };

        let mut updated = worker.clone();
        updated.status = Some(status);
        let object = to_dynamic(&updated).context(error::StatusPersistenceSnafu)?;
        self.store
            .replace_status(&api_resource::<Worker>(), &object)
            .await
            .context(error::StatusPersistenceSnafu)?;
        Ok(())
    }
}
