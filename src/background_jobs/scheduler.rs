use super::context::JobContext;
use super::handle::{SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError, ShutdownBehavior};
use crate::server_store::{JobRunStatus, JobScheduleState, ServerStore};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SHUTDOWN_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// An invocation spawned by the scheduler, keyed by its run key.
struct RunningJob {
    job_id: String,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Invocations in flight (not shared, managed by scheduler loop)
    running: HashMap<String, RunningJob>,

    /// Server store for persisting job history.
    server_store: Arc<dyn ServerStore>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        server_store: Arc<dyn ServerStore>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running: HashMap::new(),
            server_store,
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        state.jobs.insert(job_id, job);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns after the shutdown token is cancelled and
    /// running jobs have been wound down.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        match self.server_store.mark_stale_jobs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale jobs as failed from previous run", count);
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to mark stale jobs: {}", e);
            }
        }

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob {
                job_id,
                params,
                response,
            } => {
                let result = self.trigger_job(&job_id, params).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(
        &mut self,
        job_id: &str,
        params: Option<JsonValue>,
    ) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        let job = state.jobs.get(job_id).cloned().ok_or(JobError::NotFound)?;
        let run_key = job.run_key(params.as_ref())?;
        if state.running_jobs.contains(&run_key) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job, run_key, "manual", params).await;
        Ok(())
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = Duration::from_secs(60);

        let state = self.shared_state.read().await;
        for (job_id, job) in &state.jobs {
            if state.is_job_running(job_id) {
                continue;
            }

            if let Some(next_run) = self.get_next_run_time(job_id, job.as_ref()) {
                let now = chrono::Utc::now();
                if next_run > now {
                    let duration = (next_run - now).to_std().unwrap_or(Duration::from_secs(1));
                    if duration < min_duration {
                        min_duration = duration;
                    }
                } else {
                    return Duration::from_secs(0);
                }
            }
        }

        min_duration
    }

    /// Next scheduled run of an interval job. A job that never ran is due now.
    fn get_next_run_time(
        &self,
        job_id: &str,
        job: &dyn BackgroundJob,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        job.schedule().interval()?;
        match self.server_store.get_schedule_state(job_id) {
            Ok(Some(state)) => Some(state.next_run_at),
            _ => Some(chrono::Utc::now()),
        }
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        let now = chrono::Utc::now();
        let mut jobs_to_run = Vec::new();

        {
            let state = self.shared_state.read().await;
            for (job_id, job) in &state.jobs {
                if state.is_job_running(job_id) {
                    continue;
                }

                if let Some(next_run) = self.get_next_run_time(job_id, job.as_ref()) {
                    if next_run <= now {
                        jobs_to_run.push(Arc::clone(job));
                    }
                }
            }
        }

        for job in jobs_to_run {
            let run_key = job.id().to_string();
            self.spawn_job(job, run_key, "schedule", None).await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(
        &mut self,
        job: Arc<dyn BackgroundJob>,
        run_key: String,
        triggered_by: &str,
        params: Option<JsonValue>,
    ) {
        let job_id = job.id().to_string();

        let run_id = match self.server_store.record_job_start(&job_id, triggered_by) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to record job start for {}: {}", job_id, e);
                return;
            }
        };

        info!(
            "Starting job: {} (run_id: {}, run_key: {}, triggered_by: {})",
            job_id, run_id, run_key, triggered_by
        );

        {
            let mut state = self.shared_state.write().await;
            state.running_jobs.insert(run_key.clone());
        }

        // Push next_run_at forward now, so the loop doesn't respawn an interval
        // job while this run is still going.
        if let Some(interval) = job.schedule().interval() {
            let schedule_state = JobScheduleState {
                job_id: job_id.clone(),
                next_run_at: chrono::Utc::now()
                    + chrono::Duration::from_std(interval).unwrap_or_default(),
                last_run_at: None,
            };
            if let Err(e) = self.server_store.update_schedule_state(&schedule_state) {
                warn!("Failed to initialize schedule state for {}: {}", job_id, e);
            }
        }

        let cancel_token = self.job_context.cancellation_token.child_token();
        let ctx = self.job_context.with_token(cancel_token.clone());

        let server_store = Arc::clone(&self.server_store);
        let shared_state = Arc::clone(&self.shared_state);
        let task_job_id = job_id.clone();
        let task_run_key = run_key.clone();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result =
                tokio::task::spawn_blocking(move || job.execute_with_params(&ctx, params)).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg) = match result {
                Ok(result) => run_outcome(&task_job_id, &result, elapsed),
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", task_job_id, elapsed, e);
                    (JobRunStatus::Failed, Some(format!("Task panic: {}", e)))
                }
            };

            if let Err(e) = server_store.record_job_finish(run_id, status, error_msg) {
                error!("Failed to record job finish for {}: {}", task_job_id, e);
            }

            let mut state = shared_state.write().await;
            state.running_jobs.remove(&task_run_key);
        });

        self.running.insert(
            run_key,
            RunningJob {
                job_id,
                handle,
                cancel_token,
            },
        );
    }

    /// Update schedule state after a job completes (for interval-based jobs).
    async fn update_schedule_after_run(&self, job_id: &str) {
        let job = {
            let state = self.shared_state.read().await;
            match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => return,
            }
        };

        if let Some(interval) = job.schedule().interval() {
            let now = chrono::Utc::now();
            let state = JobScheduleState {
                job_id: job_id.to_string(),
                next_run_at: now + chrono::Duration::from_std(interval).unwrap_or_default(),
                last_run_at: Some(now),
            };

            if let Err(e) = self.server_store.update_schedule_state(&state) {
                error!("Failed to update schedule state for {}: {}", job_id, e);
            }
        }
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running
            .iter()
            .filter(|(_, running)| running.handle.is_finished())
            .map(|(run_key, _)| run_key.clone())
            .collect();

        for run_key in completed {
            if let Some(running) = self.running.remove(&run_key) {
                let _ = running.handle.await;
                self.update_schedule_after_run(&running.job_id).await;
            }
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        let mut wait_jobs = Vec::new();
        {
            let state = self.shared_state.read().await;
            for (run_key, running) in self.running.drain() {
                let behavior = state
                    .jobs
                    .get(&running.job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or_default();
                if behavior == ShutdownBehavior::Cancellable {
                    debug!("Cancelling job: {}", run_key);
                    running.cancel_token.cancel();
                } else {
                    info!("Waiting for job {} to complete...", run_key);
                }
                wait_jobs.push((run_key, running.handle));
            }
        }

        for (run_key, handle) in wait_jobs {
            if tokio::time::timeout(SHUTDOWN_JOB_TIMEOUT, handle)
                .await
                .is_err()
            {
                warn!("Job {} did not stop within {:?}", run_key, SHUTDOWN_JOB_TIMEOUT);
            }
        }

        info!("Scheduler shutdown complete");
    }
}

/// Logs the result of an invocation and turns it into what `job_runs` records.
fn run_outcome(
    job_id: &str,
    result: &Result<(), JobError>,
    elapsed: Duration,
) -> (JobRunStatus, Option<String>) {
    match result {
        Ok(()) => {
            info!("Job {} completed successfully in {:?}", job_id, elapsed);
            (JobRunStatus::Completed, None)
        }
        Err(JobError::Cancelled) => {
            info!("Job {} was cancelled after {:?}", job_id, elapsed);
            (JobRunStatus::Failed, Some("Cancelled".to_string()))
        }
        Err(e) => {
            error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
            (JobRunStatus::Failed, Some(e.to_string()))
        }
    }
}

/// Runs one invocation on the calling thread, outside of any scheduler loop.
///
/// The run is recorded in the job history like a scheduled one. Concurrency
/// keys are only enforced between invocations of the same scheduler, so this
/// doesn't know about runs of a scheduler in another process.
pub fn run_job_now(
    job: &dyn BackgroundJob,
    ctx: &JobContext,
    params: Option<JsonValue>,
    triggered_by: &str,
) -> Result<(), JobError> {
    let run_key = job.run_key(params.as_ref())?;
    let run_id = ctx
        .server_store
        .record_job_start(job.id(), triggered_by)
        .map_err(|e| JobError::ExecutionFailed(format!("Failed to record job start: {}", e)))?;
    info!(
        "Running job: {} (run_id: {}, run_key: {}, triggered_by: {})",
        job.id(),
        run_id,
        run_key,
        triggered_by
    );

    let start_time = Instant::now();
    let result = job.execute_with_params(ctx, params);
    let (status, error_msg) = run_outcome(job.id(), &result, start_time.elapsed());

    if let Err(e) = ctx.server_store.record_job_finish(run_id, status, error_msg) {
        error!("Failed to record job finish for {}: {}", job.id(), e);
    }
    result
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    server_store: Arc<dyn ServerStore>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState {
        jobs: HashMap::new(),
        running_jobs: HashSet::new(),
    }));

    let scheduler = JobScheduler::new(
        server_store,
        command_rx,
        shutdown_token,
        job_context,
        shared_state,
    );

    let handle = SchedulerHandle::new(command_tx);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::JobSchedule;
    use crate::catalog_store::SqliteGameCatalog;
    use crate::server_store::{JobRun, SqliteServerStore};
    use crate::user::SqliteUserStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        execution_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    impl TestJob {
        fn new(
            id: &'static str,
            schedule: JobSchedule,
            should_fail: bool,
        ) -> (Arc<Self>, Arc<AtomicUsize>) {
            let count = Arc::new(AtomicUsize::new(0));
            let job = Arc::new(TestJob {
                id,
                schedule,
                execution_count: count.clone(),
                should_fail,
            });
            (job, count)
        }

        fn manual(id: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
            Self::new(id, JobSchedule::Manual, false)
        }
    }

    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Blocks until released or cancelled. Needs `{"user_id": N}`.
    struct PerUserJob {
        release: Arc<AtomicBool>,
        seen: Arc<std::sync::Mutex<Vec<u64>>>,
    }

    fn user_id_param(params: Option<&JsonValue>) -> Result<u64, JobError> {
        params
            .and_then(|p| p.get("user_id"))
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| JobError::InvalidParams("user_id is required".to_string()))
    }

    impl BackgroundJob for PerUserJob {
        fn id(&self) -> &'static str {
            "per_user"
        }

        fn name(&self) -> &'static str {
            "Per User"
        }

        fn description(&self) -> &'static str {
            "Runs once per user at a time"
        }

        fn schedule(&self) -> JobSchedule {
            JobSchedule::Manual
        }

        fn run_key(&self, params: Option<&JsonValue>) -> Result<String, JobError> {
            Ok(format!("per_user:user:{}", user_id_param(params)?))
        }

        fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
            self.execute_with_params(ctx, None)
        }

        fn execute_with_params(
            &self,
            ctx: &JobContext,
            params: Option<JsonValue>,
        ) -> Result<(), JobError> {
            let user_id = user_id_param(params.as_ref())?;
            self.seen.lock().unwrap().push(user_id);
            while !self.release.load(Ordering::SeqCst) {
                if ctx.is_cancelled() {
                    return Err(JobError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        }
    }

    struct TestScheduler {
        scheduler: JobScheduler,
        handle: SchedulerHandle,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        _temp_dir: TempDir,
    }

    fn history(ctx: &JobContext, job_id: &str) -> Vec<JobRun> {
        ctx.server_store.get_job_history(job_id, 10).unwrap()
    }

    fn running_count(ctx: &JobContext) -> usize {
        ctx.server_store.get_running_jobs().unwrap().len()
    }

    fn create_test_scheduler() -> TestScheduler {
        let temp_dir = TempDir::new().unwrap();
        let server_store: Arc<dyn ServerStore> =
            Arc::new(SqliteServerStore::new(temp_dir.path().join("server.db")).unwrap());
        let user_store = Arc::new(SqliteUserStore::new(temp_dir.path().join("user.db")).unwrap());
        let catalog =
            Arc::new(SqliteGameCatalog::new(temp_dir.path().join("catalog.db")).unwrap());

        let shutdown_token = CancellationToken::new();

        let job_context = JobContext::new(
            shutdown_token.child_token(),
            user_store,
            catalog,
            server_store.clone(),
        );

        let (scheduler, handle) =
            create_scheduler(server_store, shutdown_token.clone(), job_context.clone());

        TestScheduler {
            scheduler,
            handle,
            shutdown_token,
            job_context,
            _temp_dir: temp_dir,
        }
    }

    async fn stop(shutdown_token: CancellationToken, sched_handle: JoinHandle<()>) {
        shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(3), sched_handle).await;
    }

    #[tokio::test]
    async fn test_register_jobs() {
        let mut t = create_test_scheduler();
        assert_eq!(t.scheduler.job_count().await, 0);

        for id in ["job_c", "job_a", "job_b"] {
            let (job, _) = TestJob::manual(id);
            t.scheduler.register_job(job).await;
        }
        assert_eq!(t.scheduler.job_count().await, 3);

        // Registering the same id again replaces the job.
        let (job, _) = TestJob::manual("job_a");
        t.scheduler.register_job(job).await;
        assert_eq!(t.scheduler.job_count().await, 3);
    }

    #[tokio::test]
    async fn test_manual_job_runs_only_when_triggered() {
        let mut t = create_test_scheduler();
        let (job, exec_count) = TestJob::manual("on_demand");
        t.scheduler.register_job(job).await;

        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(exec_count.load(Ordering::SeqCst), 0, "no run on startup");

        t.handle.trigger_job("on_demand", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(exec_count.load(Ordering::SeqCst), 1);
        let history = history(&t.job_context, "on_demand");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobRunStatus::Completed);
        assert_eq!(history[0].triggered_by, "manual");
        assert!(t
            .job_context
            .server_store
            .get_schedule_state("on_demand")
            .unwrap()
            .is_none());

        stop(t.shutdown_token, sched_handle).await;
    }

    #[tokio::test]
    async fn test_interval_job_runs_once_when_due() {
        let mut t = create_test_scheduler();
        let (job, exec_count) = TestJob::new(
            "daily",
            JobSchedule::Interval(Duration::from_secs(24 * 60 * 60)),
            false,
        );
        t.scheduler.register_job(job).await;

        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(exec_count.load(Ordering::SeqCst), 1);
        assert_eq!(history(&t.job_context, "daily")[0].triggered_by, "schedule");
        let state = t
            .job_context
            .server_store
            .get_schedule_state("daily")
            .unwrap()
            .unwrap();
        assert!(state.next_run_at > chrono::Utc::now() + chrono::Duration::hours(23));

        stop(t.shutdown_token, sched_handle).await;
    }

    #[tokio::test]
    async fn test_failed_job_records_error() {
        let mut t = create_test_scheduler();
        let (job, exec_count) = TestJob::new("failing_job", JobSchedule::Manual, true);
        t.scheduler.register_job(job).await;

        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });
        t.handle.trigger_job("failing_job", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(exec_count.load(Ordering::SeqCst), 1);
        let history = history(&t.job_context, "failing_job");
        assert_eq!(history[0].status, JobRunStatus::Failed);
        assert!(history[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("Test failure"));

        stop(t.shutdown_token, sched_handle).await;
    }

    #[tokio::test]
    async fn test_trigger_unknown_job_is_not_found() {
        let t = create_test_scheduler();
        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        let result = t.handle.trigger_job("nope", None).await;
        assert!(matches!(result, Err(JobError::NotFound)));

        stop(t.shutdown_token, sched_handle).await;
    }

    #[tokio::test]
    async fn test_stale_runs_are_failed_on_start() {
        let t = create_test_scheduler();
        t.job_context
            .server_store
            .record_job_start("spam_sweep", "schedule")
            .unwrap();

        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(running_count(&t.job_context), 0);
        assert_eq!(history(&t.job_context, "spam_sweep")[0].status, JobRunStatus::Failed);

        stop(t.shutdown_token, sched_handle).await;
    }

    #[tokio::test]
    async fn test_per_user_run_keys() {
        let mut t = create_test_scheduler();
        let release = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        t.scheduler
            .register_job(Arc::new(PerUserJob {
                release: release.clone(),
                seen: seen.clone(),
            }))
            .await;

        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        let invalid = t.handle.trigger_job("per_user", None).await;
        assert!(matches!(invalid, Err(JobError::InvalidParams(_))));

        t.handle
            .trigger_job("per_user", Some(json!({"user_id": 1})))
            .await
            .unwrap();
        let again = t
            .handle
            .trigger_job("per_user", Some(json!({"user_id": 1})))
            .await;
        assert!(matches!(again, Err(JobError::AlreadyRunning)));
        t.handle
            .trigger_job("per_user", Some(json!({"user_id": 2})))
            .await
            .unwrap();
        assert_eq!(running_count(&t.job_context), 2);

        release.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(running_count(&t.job_context), 0);
        let mut users = seen.lock().unwrap().clone();
        users.sort();
        assert_eq!(users, vec![1, 2]);
        let history = history(&t.job_context, "per_user");
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .all(|run| run.status == JobRunStatus::Completed && run.triggered_by == "manual"));

        // The key is free again once the run finished.
        t.handle
            .trigger_job("per_user", Some(json!({"user_id": 1})))
            .await
            .unwrap();

        stop(t.shutdown_token, sched_handle).await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_job() {
        let mut t = create_test_scheduler();
        t.scheduler
            .register_job(Arc::new(PerUserJob {
                release: Arc::new(AtomicBool::new(false)),
                seen: Arc::new(std::sync::Mutex::new(Vec::new())),
            }))
            .await;

        let mut scheduler = t.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });
        t.handle
            .trigger_job("per_user", Some(json!({"user_id": 9})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        t.shutdown_token.cancel();
        tokio::time::timeout(Duration::from_secs(3), sched_handle)
            .await
            .expect("scheduler should stop")
            .unwrap();

        let history = history(&t.job_context, "per_user");
        assert_eq!(history[0].status, JobRunStatus::Failed);
        assert_eq!(history[0].error_message.as_deref(), Some("Cancelled"));
    }

    #[test]
    fn test_run_job_now_records_history() {
        let t = create_test_scheduler();
        let (job, exec_count) = TestJob::manual("cli_job");

        run_job_now(job.as_ref(), &t.job_context, None, "cli").unwrap();

        assert_eq!(exec_count.load(Ordering::SeqCst), 1);
        let history = history(&t.job_context, "cli_job");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobRunStatus::Completed);
        assert_eq!(history[0].triggered_by, "cli");
    }

    #[test]
    fn test_run_job_now_rejects_invalid_params_without_recording() {
        let t = create_test_scheduler();
        let job = PerUserJob {
            release: Arc::new(AtomicBool::new(true)),
            seen: Arc::new(std::sync::Mutex::new(Vec::new())),
        };

        let result = run_job_now(&job, &t.job_context, Some(json!({"user": 1})), "cli");

        assert!(matches!(result, Err(JobError::InvalidParams(_))));
        assert!(history(&t.job_context, "per_user").is_empty());
    }
}
