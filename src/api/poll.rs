//! Job-status polling.
//!
//! An explicit forward-only state machine: `Submitted → Processing →
//! {Done, Failed}`, with a local timeout terminal state once the deadline
//! elapses. The status query is injected as a closure so the loop can be
//! driven deterministically in tests.

use std::future::Future;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::PollConfig;
use crate::error::{ReminiError, Result};
use crate::models::task::{TaskResult, TaskStatusResponse};
use crate::models::JobStatus;

/// Poll until the task reaches a terminal state or the deadline elapses.
///
/// `query` returns `None` when the status endpoint reports 404, which the
/// service emits while a freshly submitted task is still being registered;
/// that counts as queued. Once the deadline passes no further queries are
/// issued. The inter-poll sleep grows by half each round, capped at
/// `max_interval`, so slow jobs poll gently while fast ones stay snappy.
pub(crate) async fn await_completion<F, Fut>(
    task_id: &str,
    cfg: &PollConfig,
    mut query: F,
) -> Result<TaskResult>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<TaskStatusResponse>>>,
{
    let started = Instant::now();
    let deadline = started + cfg.max_wait;
    let mut interval = cfg.interval;
    let mut last_status = JobStatus::Queued;

    info!(task_id, "Waiting for task to complete");
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        sleep(interval.min(remaining)).await;
        if Instant::now() >= deadline {
            return Err(ReminiError::Timeout {
                task_id: task_id.to_string(),
                waited: cfg.max_wait,
            });
        }

        let status = match query().await? {
            None => {
                debug!(task_id, "Task not registered yet, still polling");
                last_status.clone()
            }
            Some(snapshot) => match snapshot.status.clone() {
                JobStatus::Completed => {
                    let output_url = snapshot.output_url().ok_or_else(|| {
                        ReminiError::Api("task completed but returned no output URL".to_string())
                    })?;
                    info!(task_id, "Task completed");
                    return Ok(TaskResult {
                        task_id: task_id.to_string(),
                        output_url: output_url.to_string(),
                    });
                }
                JobStatus::Failed => {
                    return Err(ReminiError::Api(format!(
                        "task failed during processing: {}",
                        snapshot.failure_reason()
                    )));
                }
                JobStatus::Unknown(raw) => {
                    debug!(task_id, status = %raw, "Unrecognized task status, still polling");
                    JobStatus::Unknown(raw)
                }
                other => other,
            },
        };

        if status != last_status {
            debug!(task_id, from = ?last_status, to = ?status, "Task status changed");
            last_status = status;
        }

        interval = interval.saturating_mul(3) / 2;
        if interval > cfg.max_interval {
            interval = cfg.max_interval;
        }
    }
}
