/*!
A reconciliation pass converges a worker's stack one stage at a time.

Each stage declares the stages it must follow. Those dependencies are soft: a stage that refers
to another object by name tolerates that object not existing yet, so a pass never waits on one.
The execution order is a stable topological sort of the declarations. The first stage error ends
the pass; the next pass starts over from the first stage.
!*/
use crate::config::ControllerConfig;
use crate::converge::{ensure, OperationResult};
use crate::error::{self, Result};
use crate::ownership::{bind_controller, controller_reference};
use crate::remote::{BootstrapReport, ManifestSource, RemoteBootstrap, RemoteConnector};
use crate::templates::WorkerTemplate;
use models::capi::ManagedResource;
use models::store::ObjectStore;
use models::worker::Worker;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use snafu::ResultExt;
use std::fmt;
use tracing::{event, instrument, Level};

/// One step of a reconciliation pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Stage {
    Cluster,
    KubeadmConfigTemplate,
    KubeadmControlPlane,
    AzureMachineTemplate,
    MachineDeployment,
    AzureCluster,
    RemoteBootstrap,
}

impl Stage {
    /// Every stage, in declaration order.
    pub const ALL: [Stage; 7] = [
        Stage::Cluster,
        Stage::KubeadmConfigTemplate,
        Stage::KubeadmControlPlane,
        Stage::AzureMachineTemplate,
        Stage::MachineDeployment,
        Stage::AzureCluster,
        Stage::RemoteBootstrap,
    ];

    /// Stages which must run before this one.
    pub fn depends_on(&self) -> &'static [Stage] {
        match self {
            Self::MachineDeployment => &[Self::KubeadmConfigTemplate, Self::AzureMachineTemplate],
            Self::AzureCluster => &[Self::Cluster],
            Self::RemoteBootstrap => &[
                Self::Cluster,
                Self::KubeadmConfigTemplate,
                Self::KubeadmControlPlane,
                Self::AzureMachineTemplate,
                Self::MachineDeployment,
                Self::AzureCluster,
            ],
            _ => &[],
        }
    }

    /// Stages whose objects this stage's object refers to by name. The referenced objects need
    /// not exist yet.
    pub fn references(&self) -> &'static [Stage] {
        match self {
            Self::Cluster => &[Self::KubeadmControlPlane, Self::AzureCluster],
            Self::KubeadmControlPlane => &[Self::AzureMachineTemplate],
            Self::MachineDeployment => &[
                Self::Cluster,
                Self::KubeadmConfigTemplate,
                Self::AzureMachineTemplate,
            ],
            _ => &[],
        }
    }

    /// Whether the stage's object is owned by the worker.
    pub fn owned(&self) -> bool {
        !matches!(self, Self::RemoteBootstrap)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Orders `nodes` so that every node follows its dependencies. Among nodes that are ready at the
/// same time, the one listed first in `nodes` goes first. Dependencies not in `nodes` are ignored.
pub fn topological_order<T, F>(nodes: &[T], dependencies: F) -> Result<Vec<T>>
where
    T: Copy + Eq + fmt::Display,
    F: Fn(&T) -> Vec<T>,
{
    let mut placed = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        let next = (0..nodes.len()).find(|&index| {
            !placed[index]
                && dependencies(&nodes[index]).iter().all(|dependency| {
                    nodes
                        .iter()
                        .position(|node| node == dependency)
                        .map_or(true, |position| placed[position])
                })
        });

        match next {
            Some(index) => {
                placed[index] = true;
                order.push(nodes[index]);
            }
            None => {
                let stages = nodes
                    .iter()
                    .zip(placed.iter())
                    .filter(|(_, placed)| !**placed)
                    .map(|(node, _)| node.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return error::StageCycleSnafu { stages }.fail();
            }
        }
    }
    Ok(order)
}

/// The order stages run in.
pub fn plan() -> Result<Vec<Stage>> {
    topological_order(&Stage::ALL, |stage| stage.depends_on().to_vec())
}

/// What a successful stage did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StageOutcome {
    Converged(OperationResult),
    Bootstrapped(BootstrapReport),
}

/// The stages of a successful pass and what each did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PassReport {
    pub results: Vec<(Stage, StageOutcome)>,
}

impl PassReport {
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.results
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, outcome)| outcome)
    }

    /// Number of management-plane objects the pass created or updated.
    pub fn changed(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, outcome)| {
                matches!(outcome, StageOutcome::Converged(result) if result.changed())
            })
            .count()
    }
}

/// Runs one reconciliation pass against the management cluster.
pub struct Pipeline<'a, S: ?Sized, C: ?Sized, M: ?Sized> {
    pub store: &'a S,
    pub connector: &'a C,
    pub manifests: &'a M,
    pub config: &'a ControllerConfig,
}

impl<'a, S, C, M> Pipeline<'a, S, C, M>
where
    S: ObjectStore + ?Sized,
    C: RemoteConnector + ?Sized,
    M: ManifestSource + ?Sized,
{
    #[instrument(skip(self, worker), fields(worker = ?worker.metadata.name), err)]
    pub async fn run(&self, worker: &Worker) -> Result<PassReport> {
        let template = WorkerTemplate::from_worker(worker, &self.config.cloud)?;
        let owner = controller_reference(worker)?;

        let mut report = PassReport::default();
        for stage in plan()? {
            let outcome = self
                .run_stage(stage, &template, &owner)
                .await
                .map_err(Box::new)
                .context(error::StageSnafu { stage })?;
            event!(
                Level::DEBUG,
                %stage,
                references = ?stage.references(),
                ?outcome,
                "Stage complete."
            );
            report.results.push((stage, outcome));
        }
        Ok(report)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        template: &WorkerTemplate<'_>,
        owner: &OwnerReference,
    ) -> Result<StageOutcome> {
        match stage {
            Stage::Cluster => self.converge(stage, &template.cluster(), owner).await,
            Stage::KubeadmConfigTemplate => {
                self.converge(stage, &template.kubeadm_config_template()?, owner)
                    .await
            }
            Stage::KubeadmControlPlane => {
                self.converge(stage, &template.kubeadm_control_plane()?, owner)
                    .await
            }
            Stage::AzureMachineTemplate => {
                self.converge(stage, &template.azure_machine_template(), owner)
                    .await
            }
            Stage::MachineDeployment => {
                self.converge(stage, &template.machine_deployment(), owner)
                    .await
            }
            Stage::AzureCluster => self.converge(stage, &template.azure_cluster(), owner).await,
            Stage::RemoteBootstrap => RemoteBootstrap {
                management: self.store,
                connector: self.connector,
                manifests: self.manifests,
                config: self.config,
            }
            .run(template.namespace, template.name)
            .await
            .map(StageOutcome::Bootstrapped),
        }
    }

    async fn converge<K: ManagedResource>(
        &self,
        stage: Stage,
        desired: &K,
        owner: &OwnerReference,
    ) -> Result<StageOutcome> {
        let owned = stage.owned();
        ensure(self.store, desired, |live: &mut K| {
            live.overwrite_managed(desired);
            if owned {
                bind_controller(live, owner)?;
            }
            Ok(())
        })
        .await
        .map(StageOutcome::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_reproduces_declared_order() {
        assert_eq!(plan().unwrap(), Stage::ALL.to_vec());
    }

    #[test]
    fn test_plan_dependencies_precede_dependents() {
        let order = plan().unwrap();
        let position = |stage: &Stage| order.iter().position(|s| s == stage).unwrap();
        for stage in &order {
            for dependency in stage.depends_on() {
                assert!(position(dependency) < position(stage), "{} before {}", dependency, stage);
            }
        }
    }

    #[test]
    fn test_only_bootstrap_is_unowned() {
        let unowned: Vec<_> = Stage::ALL.iter().filter(|stage| !stage.owned()).collect();
        assert_eq!(unowned, vec![&Stage::RemoteBootstrap]);
    }

    #[test]
    fn test_topological_order_is_stable() {
        // "c" must follow "d"; everything else keeps its listed position.
        let nodes = ["a", "b", "c", "d", "e"];
        let order = topological_order(&nodes, |node| match *node {
            "c" => vec!["d"],
            _ => vec![],
        })
        .unwrap();
        assert_eq!(order, vec!["a", "b", "d", "c", "e"]);
    }

    #[test]
    fn test_topological_order_ignores_unknown_dependencies() {
        let nodes = ["a", "b"];
        let order = topological_order(&nodes, |_| vec!["z"]).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_topological_order_detects_cycles() {
        let nodes = ["a", "b", "c"];
        let err = topological_order(&nodes, |node| match *node {
            "a" => vec!["c"],
            "c" => vec!["a"],
            _ => vec![],
        })
        .unwrap_err();
        assert!(matches!(err, error::Error::StageCycle { .. }));
        assert_eq!(err.to_string(), "Pipeline stages form a cycle: a, c");
    }
}
