use crate::error::{Error, ErrorClass};

use prometheus::{Histogram, HistogramOpts, HistogramTimer, IntCounterVec, Opts, Registry};
use tracing::instrument;

const RESULT_LABEL: &str = "result";
const STAGE_LABEL: &str = "stage";

/// Counters and timings for worker reconciliation passes.
#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconcile_total: IntCounterVec,
    stage_failures_total: IntCounterVec,
    reconcile_duration: Histogram,
}

impl ControllerMetrics {
    /// Creates the metrics and registers them with `registry`.
    #[instrument(skip(registry), err)]
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let reconcile_total = IntCounterVec::new(
            Opts::new(
                "carp_reconcile_total",
                "Worker reconciliation passes by result",
            ),
            &[RESULT_LABEL],
        )?;
        let stage_failures_total = IntCounterVec::new(
            Opts::new(
                "carp_stage_failures_total",
                "Failed reconciliation stages by stage",
            ),
            &[STAGE_LABEL],
        )?;
        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new(
                "carp_reconcile_duration_seconds",
                "Duration of worker reconciliation passes",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 60.0]),
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(stage_failures_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        Ok(ControllerMetrics {
            reconcile_total,
            stage_failures_total,
            reconcile_duration,
        })
    }

    /// Starts timing a pass. The duration is recorded when the timer is dropped.
    pub fn start_pass(&self) -> HistogramTimer {
        self.reconcile_duration.start_timer()
    }

    /// Counts a finished pass.
    pub fn record_pass<T>(&self, result: &Result<T, Error>) {
        let label = match result {
            Ok(_) => "success",
            Err(err) => match err.class() {
                ErrorClass::RemoteNotReady => "remote_not_ready",
                ErrorClass::Configuration => "configuration_error",
                ErrorClass::Upstream => "upstream_error",
                ErrorClass::StatusPersistence => "status_error",
            },
        };
        self.reconcile_total.with_label_values(&[label]).inc();

        if let Some(stage) = result.as_ref().err().and_then(Error::stage) {
            self.stage_failures_total
                .with_label_values(&[&stage.to_string()])
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    #[test]
    fn test_passes_are_counted_by_result_and_stage() {
        let registry = Registry::new();
        let metrics = ControllerMetrics::new(&registry).unwrap();

        metrics.record_pass(&Ok::<(), Error>(()));
        metrics.record_pass::<()>(&Err(Error::Stage {
            stage: Stage::RemoteBootstrap,
            source: Box::new(Error::RemoteNotReady {
                namespace: "default".to_string(),
                name: "alpha-kubeconfig".to_string(),
            }),
        }));
        drop(metrics.start_pass());

        assert_eq!(
            metrics.reconcile_total.with_label_values(&["success"]).get(),
            1
        );
        assert_eq!(
            metrics
                .reconcile_total
                .with_label_values(&["remote_not_ready"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .stage_failures_total
                .with_label_values(&["RemoteBootstrap"])
                .get(),
            1
        );
        assert_eq!(metrics.reconcile_duration.get_sample_count(), 1);

        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"carp_reconcile_total".to_string()));
    }

    #[test]
    fn test_metrics_register_once_per_registry() {
        let registry = Registry::new();
        ControllerMetrics::new(&registry).unwrap();
        assert!(ControllerMetrics::new(&registry).is_err());
    }
}
