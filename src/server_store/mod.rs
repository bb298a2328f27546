mod models;
mod schema;
mod sqlite_server_store;

pub use models::*;
pub use schema::SERVER_VERSIONED_SCHEMAS;
pub use sqlite_server_store::SqliteServerStore;

use anyhow::Result;

/// Persists named counters produced by jobs.
pub trait ActionLog: Send + Sync {
    /// Appends a value for the counter `name`.
    fn record(&self, name: &str, value: i64) -> Result<()>;

    /// Returns the most recent values recorded for `name`, newest first.
    fn get_action_log(&self, name: &str, limit: usize) -> Result<Vec<ActionLogEntry>>;
}

pub trait ServerStore: ActionLog + Send + Sync {
    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64>;
    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()>;
    fn get_running_jobs(&self) -> Result<Vec<JobRun>>;
    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>>;
    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>>;
    fn mark_stale_jobs_failed(&self) -> Result<usize>;

    // Schedule state
    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>>;
    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()>;

    // Job audit log
    fn log_job_audit(
        &self,
        job_id: &str,
        event_type: JobAuditEventType,
        duration_ms: Option<i64>,
        details: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<i64>;
    fn get_job_audit_log(&self, limit: usize, offset: usize) -> Result<Vec<JobAuditEntry>>;
    fn get_job_audit_log_by_job(
        &self,
        job_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobAuditEntry>>;

    // Job requests
    fn enqueue_job_request(
        &self,
        job_id: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<i64>;
    /// Oldest requests first.
    fn get_pending_job_requests(&self, limit: usize) -> Result<Vec<JobRequest>>;
    fn delete_job_request(&self, id: i64) -> Result<()>;
}
