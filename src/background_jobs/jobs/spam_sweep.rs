//! Spam account sweep job.
//!
//! Deletes accounts flagged by the spam classifier and records how many were
//! flagged in the action log, under `spam_website_deleted` and
//! `spam_avatar_deleted`.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
    JobAuditLogger,
};
use crate::config::SpamSweepJobSettings;
use crate::server_store::ActionLog;
use crate::user::{AccountStore, SpamClassifier, User};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const SPAM_WEBSITE_COUNTER: &str = "spam_website_deleted";
pub const SPAM_AVATAR_COUNTER: &str = "spam_avatar_deleted";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub website_candidates: usize,
    pub website_deleted_rows: usize,
    pub avatar_candidates: usize,
    pub avatar_deleted_rows: usize,
}

fn ids(users: &[User]) -> Vec<usize> {
    users.iter().map(|u| u.id).collect()
}

/// Deletes both candidate sets, one after the other.
///
/// The recorded counters are the candidate set sizes. An account in both sets
/// is only removed by the first deletion, so the second one can remove fewer
/// rows than it was given.
pub fn sweep_spammers<A, L>(
    classifier: &dyn SpamClassifier,
    accounts: &A,
    action_log: &L,
) -> Result<SweepReport>
where
    A: AccountStore + ?Sized,
    L: ActionLog + ?Sized,
{
    let mut report = SweepReport::default();

    let website_spammers = classifier.no_games_with_website()?;
    report.website_candidates = website_spammers.len();
    report.website_deleted_rows = accounts.delete_users(&ids(&website_spammers))?;
    action_log.record(SPAM_WEBSITE_COUNTER, report.website_candidates as i64)?;
    info!(
        "Deleted {} accounts with a website and no games",
        report.website_deleted_rows
    );

    let avatar_spammers = classifier.spam_avatar_users()?;
    report.avatar_candidates = avatar_spammers.len();
    report.avatar_deleted_rows = accounts.delete_users(&ids(&avatar_spammers))?;
    action_log.record(SPAM_AVATAR_COUNTER, report.avatar_candidates as i64)?;
    info!(
        "Deleted {} accounts with a spam avatar",
        report.avatar_deleted_rows
    );

    Ok(report)
}

pub struct SpamSweepJob {
    classifier: Arc<dyn SpamClassifier>,
    interval_hours: u64,
}

impl SpamSweepJob {
    pub fn from_settings(
        settings: &SpamSweepJobSettings,
        classifier: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            classifier,
            interval_hours: settings.interval_hours,
        }
    }
}

impl BackgroundJob for SpamSweepJob {
    fn id(&self) -> &'static str {
        "spam_sweep"
    }

    fn name(&self) -> &'static str {
        "Spam Sweep"
    }

    fn description(&self) -> &'static str {
        "Delete accounts flagged as spam and record how many were removed"
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

        match sweep_spammers(
            self.classifier.as_ref(),
            ctx.user_store.as_ref(),
            ctx.server_store.as_ref(),
        ) {
            Ok(report) => {
                audit.log_completed(Some(serde_json::json!(report)));
                Ok(())
            }
            Err(e) => {
                let error_msg = format!("Spam sweep failed: {:#}", e);
                audit.log_failed(&error_msg, None);
                Err(JobError::ExecutionFailed(error_msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fakes::{FakeActionLog, FakeSpamClassifier, FakeUserStore};

    fn user(store: &FakeUserStore, handle: &str) -> User {
        let id = store.add_user(handle, None);
        store.get_user(id).unwrap().unwrap()
    }

    #[test]
    fn test_job_metadata() {
        let job = SpamSweepJob::from_settings(
            &SpamSweepJobSettings::default(),
            Arc::new(FakeSpamClassifier {
                website_spammers: vec![],
                avatar_spammers: vec![],
            }),
        );

        assert_eq!(job.id(), "spam_sweep");
        assert_eq!(job.name(), "Spam Sweep");
        assert!(!job.description().is_empty());
        assert_eq!(job.interval_hours, 24);
        match job.schedule() {
            JobSchedule::Interval(duration) => {
                assert_eq!(duration, Duration::from_secs(24 * 60 * 60));
            }
            _ => panic!("Expected Interval schedule"),
        }
    }

    #[test]
    fn test_overlapping_sets_delete_once_and_count_candidates() {
        let store = FakeUserStore::default();
        let both = user(&store, "both");
        let website_only = user(&store, "website");
        let avatar_only = user(&store, "avatar");
        let innocent = user(&store, "innocent");
        let classifier = FakeSpamClassifier {
            website_spammers: vec![both.clone(), website_only],
            avatar_spammers: vec![both, avatar_only],
        };
        let action_log = FakeActionLog::default();

        let report = sweep_spammers(&classifier, &store, &action_log).unwrap();

        assert_eq!(
            report,
            SweepReport {
                website_candidates: 2,
                website_deleted_rows: 2,
                avatar_candidates: 2,
                avatar_deleted_rows: 1,
            }
        );
        assert_eq!(store.user_ids(), vec![innocent.id]);
        assert_eq!(
            *action_log.records.lock().unwrap(),
            vec![
                (SPAM_WEBSITE_COUNTER.to_string(), 2),
                (SPAM_AVATAR_COUNTER.to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_empty_sets_still_record_counters() {
        let store = FakeUserStore::default();
        let classifier = FakeSpamClassifier {
            website_spammers: vec![],
            avatar_spammers: vec![],
        };
        let action_log = FakeActionLog::default();

        let report = sweep_spammers(&classifier, &store, &action_log).unwrap();

        assert_eq!(report, SweepReport::default());
        assert_eq!(action_log.records.lock().unwrap().len(), 2);
    }
}
