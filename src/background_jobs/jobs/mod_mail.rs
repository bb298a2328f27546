//! Daily moderator mail job.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    JobAuditLogger,
};
use crate::config::ModMailJobSettings;
use crate::mail::ModDigestMailer;
use std::sync::Arc;
use std::time::Duration;

/// Sends the moderator digest. What goes in the digest is up to the mailer.
pub struct ModMailJob {
    mailer: Arc<dyn ModDigestMailer>,
    interval_hours: u64,
}

impl ModMailJob {
    pub fn from_settings(settings: &ModMailJobSettings, mailer: Arc<dyn ModDigestMailer>) -> Self {
        Self {
            mailer,
            interval_hours: settings.interval_hours,
        }
    }
}

impl BackgroundJob for ModMailJob {
    fn id(&self) -> &'static str {
        "daily_mod_mail"
    }

    fn name(&self) -> &'static str {
        "Daily Mod Mail"
    }

    fn description(&self) -> &'static str {
        "Send the daily moderation digest to moderators"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(self.interval_hours * 60 * 60))
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let audit = JobAuditLogger::new(Arc::clone(&ctx.server_store), self.id());

        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        audit.log_started(None);

        match self.mailer.send_daily_mod_digest() {
            Ok(()) => {
                audit.log_completed(None);
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("Failed to send daily mod mail: {:#}", e);
                audit.log_failed(&error_msg, None);
                Err(JobError::ExecutionFailed(error_msg))
            }
        }
    }
}
