//! Steam library sync job.
//!
//! Triggered per user with `{"user_id": N}`. Syncs for different users run in
//! parallel; a second sync for the same user is rejected while one is running.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    JobAuditLogger,
};
use crate::library_sync::{ExternalLibraryFetcher, LibrarySyncer, SyncError};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

pub const LIBRARY_SYNC_JOB_ID: &str = "library_sync";

impl From<SyncError> for JobError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Cancelled => JobError::Cancelled,
            other => JobError::ExecutionFailed(other.to_string()),
        }
    }
}

pub struct LibrarySyncJob {
    fetcher: Arc<dyn ExternalLibraryFetcher>,
}

impl LibrarySyncJob {
    pub fn new(fetcher: Arc<dyn ExternalLibraryFetcher>) -> Self {
        Self { fetcher }
    }

    /// Parameters for a sync of `user_id`.
    pub fn params(user_id: usize) -> JsonValue {
        json!({ "user_id": user_id })
    }

    fn user_id(params: Option<&JsonValue>) -> Result<usize, JobError> {
        let params = params.ok_or_else(|| {
            JobError::InvalidParams("library_sync requires {\"user_id\": <id>}".to_string())
        })?;
        params
            .get("user_id")
            .and_then(JsonValue::as_u64)
            .map(|id| id as usize)
            .ok_or_else(|| {
                JobError::InvalidParams(format!(
                    "user_id must be a non-negative integer, got {}",
                    params.get("user_id").unwrap_or(&JsonValue::Null)
                ))
            })
    }
}

impl BackgroundJob for LibrarySyncJob {
    fn id(&self) -> &'static str {
        LIBRARY_SYNC_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Library Sync"
    }

    fn description(&self) -> &'static str {
        "Import a user's Steam games into their library, creating catalog games as needed"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Manual
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn run_key(&self, params: Option<&JsonValue>) -> Result<String, JobError> {
        let user_id = Self::user_id(params)?;
        Ok(format!("{}:user:{}", LIBRARY_SYNC_JOB_ID, user_id))
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        self.execute_with_params(ctx, None)
    }

    fn execute_with_params(
        &self,
        ctx: &JobContext,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let user_id = Self::user_id(params.as_ref())?;
        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        audit.log_started(Some(json!({ "user_id": user_id })));

        let syncer = LibrarySyncer::new(
            ctx.user_store.as_ref(),
            ctx.catalog.as_ref(),
            self.fetcher.as_ref(),
        );
        match syncer.sync(user_id, &ctx.cancellation_token) {
            Ok(report) => {
                audit.log_completed(Some(json!({
                    "user_id": user_id,
                    "report": report,
                })));
                Ok(())
            }
            Err(e) => {
                audit.log_failed(&e.to_string(), Some(json!({ "user_id": user_id })));
                Err(e.into())
            }
        }
    }
}
