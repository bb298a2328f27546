//! Concrete background job implementations.

pub mod library_sync;
pub mod mod_mail;
pub mod spam_sweep;

pub use library_sync::{LibrarySyncJob, LIBRARY_SYNC_JOB_ID};
pub use mod_mail::ModMailJob;
pub use spam_sweep::{sweep_spammers, SpamSweepJob, SweepReport};

use super::BackgroundJob;
use crate::config::AppConfig;
use crate::mail::HttpMailRelay;
use crate::steam::SteamClient;
use crate::user::{SqliteSpamClassifier, SqliteUserStore};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Jobs available with this configuration.
///
/// `daily_mod_mail` needs a mail relay and `library_sync` a Steam API key;
/// either is left out when its setting is missing.
pub fn build_jobs(
    app_config: &AppConfig,
    user_store: &Arc<SqliteUserStore>,
) -> Result<Vec<Arc<dyn BackgroundJob>>> {
    let mut jobs: Vec<Arc<dyn BackgroundJob>> = Vec::new();

    match &app_config.mail.relay_url {
        Some(url) => {
            let timeout = Duration::from_secs(app_config.mail.timeout_secs);
            let relay = HttpMailRelay::new(url, timeout)?;
            info!("Mail relay configured at {}", url);
            jobs.push(Arc::new(ModMailJob::from_settings(
                &app_config.background_jobs.daily_mod_mail,
                Arc::new(relay),
            )));
        }
        None => {
            warn!("No mail relay configured, daily mod mail disabled");
        }
    }

    let spam_settings = &app_config.background_jobs.spam_sweep;
    let classifier = SqliteSpamClassifier::new(
        Arc::clone(user_store),
        spam_settings.spam_avatar_hashes.clone(),
    );
    jobs.push(Arc::new(SpamSweepJob::from_settings(
        spam_settings,
        Arc::new(classifier),
    )));

    match &app_config.steam.api_key {
        Some(api_key) => {
            let client = SteamClient::new(
                api_key,
                &app_config.steam.base_url,
                Duration::from_secs(app_config.steam.timeout_secs),
            )?;
            info!("Steam API configured at {}", app_config.steam.base_url);
            jobs.push(Arc::new(LibrarySyncJob::new(Arc::new(client))));
        }
        None => {
            info!("No Steam API key configured, library sync disabled");
        }
    }

    Ok(jobs)
}
