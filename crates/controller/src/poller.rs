//! Status polling for the active job.

use std::sync::Arc;
use std::time::Duration;

use joyip_client::GenerationApi;
use joyip_core::job::JobSnapshot;
use joyip_core::types::JobId;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::session::{PollOutcome, Session};

/// Poll `job_id` until it finishes, stops being tracked, or `cancel`
/// fires.
///
/// The first check runs immediately, then one per `interval`. A failed
/// check is logged and retried on the next tick. Only one request is in
/// flight at a time: a slow response delays the next tick instead of
/// overlapping it.
pub(crate) async fn run_poll_loop(
    api: Arc<dyn GenerationApi>,
    session: Arc<Mutex<Session>>,
    job_id: JobId,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.job_status(&job_id) => result,
        };

        let record = match result {
            Ok(response) if response.success => match response.job {
                Some(record) => record,
                None => {
                    tracing::debug!(job_id = %job_id, "Status response without job, retrying");
                    continue;
                }
            },
            Ok(response) => {
                tracing::debug!(
                    job_id = %job_id,
                    error = response.error.as_deref().unwrap_or_default(),
                    "Status check unsuccessful, retrying"
                );
                continue;
            }
            Err(e) => {
                tracing::debug!(job_id = %job_id, error = %e, "Status check failed, retrying");
                continue;
            }
        };

        let outcome = session
            .lock()
            .await
            .apply_job_update(&job_id, JobSnapshot::from(record));

        match outcome {
            PollOutcome::Pending => {}
            PollOutcome::Finished(_) | PollOutcome::Stale => break,
        }
    }

    tracing::debug!(job_id = %job_id, "Poll loop stopped");
}
