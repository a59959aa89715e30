use models::worker::{WorkerPhase, WorkerSpec, WorkerStatus};

use chrono::{DateTime, Utc};
use tracing::instrument;

/// How a reconciliation pass ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PassOutcome {
    /// Every stage succeeded.
    Converged,
    /// A stage failed.
    Failed,
    /// The worker is being deleted; no stage ran.
    Deleting,
}

/// Constructs the `WorkerStatus` to record after a pass, or `None` when the worker has no status
/// and the pass gives it none.
///
/// A failed pass leaves the status as it was. Capacity is allocated once, on the first converged
/// pass, and never recomputed.
#[instrument(skip(current, spec))]
pub fn next_status(
    current: Option<&WorkerStatus>,
    spec: &WorkerSpec,
    outcome: PassOutcome,
    now: DateTime<Utc>,
) -> Option<WorkerStatus> {
    let mut status = current.cloned().unwrap_or_default();
    match outcome {
        PassOutcome::Failed => return current.cloned(),
        PassOutcome::Deleting => status.phase = WorkerPhase::Terminating,
        PassOutcome::Converged => {
            if status.available_capacity.is_none() {
                status.schedule(spec.capacity, now);
            }
            status.phase = WorkerPhase::Running;
        }
    }
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spec(capacity: i32) -> WorkerSpec {
        WorkerSpec {
            location: "westus2".to_string(),
            capacity,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_converged_pass_allocates_capacity() {
        let now = Utc.with_ymd_and_hms(2020, 4, 1, 12, 0, 0).unwrap();
        let status = next_status(None, &spec(10), PassOutcome::Converged, now).unwrap();

        assert_eq!(status.phase, WorkerPhase::Running);
        assert_eq!(status.available_capacity, Some(10));
        assert_eq!(status.last_scheduled_time().unwrap(), Some(now));
    }

    #[test]
    fn test_capacity_is_not_reallocated() {
        let first = Utc.with_ymd_and_hms(2020, 4, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2020, 4, 2, 12, 0, 0).unwrap();
        let current = WorkerStatus::new(WorkerPhase::Running, Some(4), Some(first));

        let status = next_status(Some(&current), &spec(10), PassOutcome::Converged, later);
        assert_eq!(status, Some(current));
    }

    #[test]
    fn test_failed_pass_leaves_status_alone() {
        let first = Utc.with_ymd_and_hms(2020, 4, 1, 12, 0, 0).unwrap();
        let current = WorkerStatus::new(WorkerPhase::Running, Some(10), Some(first));

        let status = next_status(Some(&current), &spec(10), PassOutcome::Failed, Utc::now());
        assert_eq!(status, Some(current));

        let status = next_status(None, &spec(10), PassOutcome::Failed, Utc::now());
        assert_eq!(status, None);
    }

    #[test]
    fn test_deleting_worker_is_terminating() {
        let status = next_status(None, &spec(10), PassOutcome::Deleting, Utc::now()).unwrap();
        assert_eq!(status.phase, WorkerPhase::Terminating);
        assert_eq!(status.available_capacity, None);
    }
}
