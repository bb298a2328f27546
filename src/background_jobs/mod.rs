//! Background job scheduling and execution system.
//!
//! Jobs run on an interval or when triggered explicitly through a
//! [`SchedulerHandle`], which the [`JobRequestPoller`] feeds from the
//! `job_request` queue.

mod audit_logger;
mod context;
mod handle;
mod job;
pub mod jobs;
mod requests;
mod scheduler;

pub use audit_logger::JobAuditLogger;
pub use context::JobContext;
pub use handle::SchedulerHandle;
pub use job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
pub use requests::JobRequestPoller;
pub use scheduler::{create_scheduler, run_job_now, JobScheduler};
