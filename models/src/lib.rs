/*!
Shared models for carp: the `Worker` and `ManagedCluster` custom resources, typed Cluster API
kinds, the object store abstraction, and the manifests used to deploy the controller.
!*/
pub mod capi;
pub mod constants;
pub mod controller;
pub mod managed_cluster;
pub mod namespace;
pub mod store;
pub mod telemetry;
pub mod worker;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Returns the definitions of every custom resource carp serves.
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![worker::Worker::crd(), managed_cluster::ManagedCluster::crd()]
}
