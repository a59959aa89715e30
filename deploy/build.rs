/*!

The custom resource definitions and the controller's deployment are modeled as Rust structs.
Here we generate the corresponding k8s yaml files.

!*/

use models::controller::{
    controller_cluster_role, controller_cluster_role_binding, controller_deployment,
    controller_service_account,
};
use models::namespace::carp_namespace;
use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

const DEPLOY_DIR: &str = env!("CARGO_MANIFEST_DIR");
const IMAGE_ENV_VAR: &str = "CARP_CONTROLLER_IMAGE";
const IMAGE_PULL_SECRET_ENV_VAR: &str = "CARP_IMAGE_PULL_SECRET";
const DEFAULT_IMAGE: &str = "carp-controller:latest";

/// Writes each value as one document of a multi-document YAML file.
fn write_documents(file: &mut File, documents: Vec<serde_yaml::Value>) {
    for document in documents {
        writeln!(file, "---").unwrap();
        serde_yaml::to_writer(&mut *file, &document).unwrap();
    }
}

fn main() {
    // Re-run this build script if the model changes.
    println!("cargo:rerun-if-changed=../models/src");
    println!("cargo:rerun-if-env-changed={}", IMAGE_ENV_VAR);
    println!("cargo:rerun-if-env-changed={}", IMAGE_PULL_SECRET_ENV_VAR);

    let golden = PathBuf::from(DEPLOY_DIR).join("tests").join("golden");
    fs::create_dir_all(&golden).unwrap();

    let mut crd_file = File::create(golden.join("custom-resource-definition.yaml")).unwrap();
    write_documents(
        &mut crd_file,
        models::crds()
            .iter()
            .map(|crd| serde_yaml::to_value(crd).unwrap())
            .collect(),
    );

    let image = env::var(IMAGE_ENV_VAR).unwrap_or_else(|_| DEFAULT_IMAGE.to_string());
    let pull_secret = env::var(IMAGE_PULL_SECRET_ENV_VAR).ok();
    let mut controller_file = File::create(golden.join("carp-controller.yaml")).unwrap();
    write_documents(
        &mut controller_file,
        vec![
            serde_yaml::to_value(carp_namespace()).unwrap(),
            serde_yaml::to_value(controller_service_account()).unwrap(),
            serde_yaml::to_value(controller_cluster_role()).unwrap(),
            serde_yaml::to_value(controller_cluster_role_binding()).unwrap(),
            serde_yaml::to_value(controller_deployment(image, pull_secret)).unwrap(),
        ],
    );
}
