use crate::config::RequeuePolicy;
use crate::error::{Error, ErrorClass, Result};
use crate::reconciler::WorkerReconciler;
use crate::remote::{ManifestSource, RemoteConnector};
use models::capi::{
    AzureCluster, AzureMachineTemplate, Cluster, KubeadmConfigTemplate, KubeadmControlPlane,
    MachineDeployment,
};
use models::store::ObjectStore;
use models::worker::Worker;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{event, Level};

fn api<K>(client: &kube::Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Runs the worker controller until the process is asked to shut down.
///
/// Each worker is reconciled when it changes, when an object it owns changes, and at the resync
/// interval after a successful pass.
pub async fn run_controller<S, C, M>(
    client: kube::Client,
    reconciler: Arc<WorkerReconciler<S, C, M>>,
) where
    S: ObjectStore + 'static,
    C: RemoteConnector + 'static,
    M: ManifestSource + 'static,
{
    let namespace = reconciler.config().watch_namespace.clone();
    let namespace = namespace.as_deref();
    let config = watcher::Config::default;

    Controller::new(api::<Worker>(&client, namespace), config())
        .owns(api::<Cluster>(&client, namespace), config())
        .owns(api::<KubeadmConfigTemplate>(&client, namespace), config())
        .owns(api::<KubeadmControlPlane>(&client, namespace), config())
        .owns(api::<AzureMachineTemplate>(&client, namespace), config())
        .owns(api::<MachineDeployment>(&client, namespace), config())
        .owns(api::<AzureCluster>(&client, namespace), config())
        .shutdown_on_signal()
        .run(reconcile::<S, C, M>, error_policy::<S, C, M>, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((worker, _)) => {
                    event!(Level::DEBUG, worker = %worker.name, "Reconciled worker.")
                }
                Err(err) => event!(Level::WARN, %err, "Worker reconciliation failed."),
            }
        })
        .await;
}

async fn reconcile<S, C, M>(
    worker: Arc<Worker>,
    reconciler: Arc<WorkerReconciler<S, C, M>>,
) -> Result<Action>
where
    S: ObjectStore,
    C: RemoteConnector,
    M: ManifestSource,
{
    reconciler.reconcile(&worker).await?;
    Ok(Action::requeue(reconciler.config().requeue.resync))
}

fn error_policy<S, C, M>(
    worker: Arc<Worker>,
    error: &Error,
    reconciler: Arc<WorkerReconciler<S, C, M>>,
) -> Action
where
    S: ObjectStore,
    C: RemoteConnector,
    M: ManifestSource,
{
    requeue_after_error(&worker, error, &reconciler.config().requeue)
}

/// Chooses when to retry a worker whose pass failed.
fn requeue_after_error(worker: &Worker, error: &Error, requeue: &RequeuePolicy) -> Action {
    match error.class() {
        ErrorClass::RemoteNotReady => {
            event!(
                Level::INFO,
                worker = %worker.name_any(),
                "Remote cluster is not ready yet."
            );
            Action::requeue(requeue.not_ready)
        }
        class => {
            event!(
                Level::WARN,
                worker = %worker.name_any(),
                ?class,
                %error,
                "Worker pass failed."
            );
            Action::requeue(requeue.error)
        }
    }
}
