//! Queue of job runs requested from outside the scheduler process.
//!
//! `accounts-worker enqueue` and other processes sharing `server.db` insert
//! rows into `job_request`. The poller started by `serve` hands them to the
//! scheduler, which applies the usual run key checks.

use super::handle::SchedulerHandle;
use super::job::JobError;
use crate::server_store::ServerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Requests read from the queue per poll.
const REQUEST_BATCH_SIZE: usize = 50;

pub struct JobRequestPoller {
    handle: SchedulerHandle,
    server_store: Arc<dyn ServerStore>,
    interval: Duration,
}

impl JobRequestPoller {
    pub fn new(
        handle: SchedulerHandle,
        server_store: Arc<dyn ServerStore>,
        interval: Duration,
    ) -> Self {
        Self {
            handle,
            server_store,
            interval,
        }
    }

    /// Hands pending requests to the scheduler, oldest first. Returns how many
    /// were started.
    ///
    /// A request whose run key is busy stays queued for a later poll. Requests
    /// for unknown jobs or with invalid parameters are dropped.
    pub async fn poll_once(&self) -> usize {
        let requests = match self.server_store.get_pending_job_requests(REQUEST_BATCH_SIZE) {
            Ok(requests) => requests,
            Err(e) => {
                error!("Failed to read job requests: {}", e);
                return 0;
            }
        };

        let mut started = 0;
        for request in requests {
            let done = match self
                .handle
                .trigger_job(&request.job_id, request.params.clone())
                .await
            {
                Ok(()) => {
                    started += 1;
                    true
                }
                Err(JobError::AlreadyRunning) => {
                    debug!(
                        "Job request {} for {} is busy, keeping it",
                        request.id, request.job_id
                    );
                    false
                }
                Err(e @ (JobError::NotFound | JobError::InvalidParams(_))) => {
                    warn!(
                        "Dropping job request {} for {}: {}",
                        request.id, request.job_id, e
                    );
                    true
                }
                Err(e) => {
                    warn!(
                        "Job request {} for {} not started: {}",
                        request.id, request.job_id, e
                    );
                    break;
                }
            };

            if done {
                if let Err(e) = self.server_store.delete_job_request(request.id) {
                    error!("Failed to delete job request {}: {}", request.id, e);
                }
            }
        }
        started
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Job request poller starting (interval={}s)",
            self.interval.as_secs()
        );

        loop {
            let started = self.poll_once().await;
            if started > 0 {
                info!("Started {} requested job runs", started);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    info!("Job request poller shutting down");
                    break;
                }
            }
        }
    }
}
