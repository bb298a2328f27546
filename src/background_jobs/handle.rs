use super::job::{BackgroundJob, JobError};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        params: Option<JsonValue>,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// State shared between the scheduler loop and the tasks it spawns.
pub struct SharedJobState {
    /// Static job info (set at registration, never changes)
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    /// Run keys of the invocations in flight
    pub running_jobs: HashSet<String>,
}

impl SharedJobState {
    /// True if any invocation of `job_id` is in flight, whatever its parameters.
    pub fn is_job_running(&self, job_id: &str) -> bool {
        self.running_jobs.iter().any(|key| {
            key == job_id
                || key
                    .strip_prefix(job_id)
                    .is_some_and(|rest| rest.starts_with(':'))
        })
    }
}

/// Handle to trigger jobs on the scheduler from other tasks.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn new(command_tx: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { command_tx }
    }

    /// Trigger a job manually. Returns once the invocation has been started,
    /// not when it finishes.
    pub async fn trigger_job(
        &self,
        job_id: &str,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                params,
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }
}
