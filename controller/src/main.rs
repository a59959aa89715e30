use std::{convert::TryFrom, sync::Arc};

use controller::{
    config::ControllerConfig,
    metrics::ControllerMetrics,
    remote::{HttpManifestSource, KubeconfigConnector},
    run_controller,
    telemetry::vending_metrics,
    WorkerReconciler,
};
use models::{store::KubeObjectStore, telemetry};

use actix_web::{web::Data, App, HttpServer};
use prometheus::Registry;
use snafu::ResultExt;
use tracing::{event, Level};

/// The module-wide result type.
type Result<T> = std::result::Result<T, controller_error::Error>;

#[actix_web::main]
async fn main() -> Result<()> {
    telemetry::init_telemetry_from_env().context(controller_error::TelemetryInitSnafu)?;

    let config = ControllerConfig::from_environment().context(controller_error::ConfigSnafu)?;
    event!(
        Level::INFO,
        watch_namespace = ?config.watch_namespace,
        metrics_port = config.metrics_port,
        "Starting carp controller."
    );

    let k8s_config = kube::Config::infer()
        .await
        .context(controller_error::ConfigCreateSnafu)?;
    let k8s_client = kube::client::Client::try_from(k8s_config)
        .context(controller_error::ClientCreateSnafu)?;

    let registry = Registry::new();
    let metrics = ControllerMetrics::new(&registry).context(controller_error::MetricsSnafu)?;
    let manifests = HttpManifestSource::new().context(controller_error::ControllerSnafu)?;

    let metrics_port = config.metrics_port;
    let reconciler = Arc::new(WorkerReconciler::new(
        KubeObjectStore::new(k8s_client.clone()),
        KubeconfigConnector,
        manifests,
        config,
        metrics,
    ));
    let controller_runner = run_controller(k8s_client, reconciler);

    // Setup Http server to vend prometheus metrics
    let registry = Data::new(registry);
    let prometheus_server = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .service(vending_metrics)
    })
    .bind(("0.0.0.0", metrics_port))
    .context(controller_error::PrometheusServerSnafu)?
    .run();

    tokio::select! {
        _ = controller_runner => {
            event!(Level::INFO, "controller exited");
        },
        server = prometheus_server => {
            event!(Level::ERROR, "metric server exited");
            server.context(controller_error::PrometheusServerSnafu)?
        }
    };
    Ok(())
}

pub mod controller_error {
    use controller::{config::config_error, error};
    use models::telemetry;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display("Unable to read controller configuration: '{}'", source))]
        Config { source: config_error::Error },

        #[snafu(display("Unable to create Kubernetes client config: '{}'", source))]
        ConfigCreate {
            source: kube::config::InferConfigError,
        },

        #[snafu(display("Unable to create Kubernetes client: '{}'", source))]
        ClientCreate { source: kube::Error },

        #[snafu(display("Error setting up controller: '{}'", source))]
        Controller { source: error::Error },

        #[snafu(display("Unable to register controller metrics: '{}'", source))]
        Metrics { source: prometheus::Error },

        #[snafu(display("Error running prometheus HTTP server: '{}'", source))]
        PrometheusServer { source: std::io::Error },

        #[snafu(display("Error configuring telemetry: '{}'", source))]
        TelemetryInit {
            source: telemetry::TelemetryConfigError,
        },
    }
}
